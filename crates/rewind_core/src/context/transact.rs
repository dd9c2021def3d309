//! Transaction scopes, closed nests and aborts.

use super::Context;
use crate::error::{Aborted, TxResult};
use crate::stack::frame_address;
use crate::transaction::{CallNest, NestKind, Transaction};
use crate::types::{ContextStatus, StackRange, TransactionId, TransactionResult};
use std::convert::Infallible;
use std::rc::Rc;
use tracing::{debug, trace, warn};

impl Context {
    /// Runs `work` as a transaction.
    ///
    /// At the top level this starts a fresh transaction; inside one it starts
    /// a nested transaction whose effects merge into the parent on commit.
    /// The work may run more than once: a refused commit or a forced retry
    /// rolls it back and runs it again.
    ///
    /// A nested transaction that resolves to
    /// [`TransactionResult::AbortedByCascade`] leaves the parent rolled back
    /// and aborting, so the parent's next notification fails.
    pub fn transact<F>(&self, mut work: F) -> TransactionResult
    where
        F: FnMut() -> TxResult<()>,
    {
        self.transact_dyn(&mut work)
    }

    /// Runs `work` as a transaction that must commit.
    ///
    /// # Panics
    ///
    /// Panics if the transaction does not commit.
    pub fn commit<F>(&self, work: F)
    where
        F: FnMut() -> TxResult<()>,
    {
        let result = self.transact(work);
        assert!(result.is_committed(), "transaction was expected to commit but {result}");
    }

    /// Starts a transaction and runs `work` in it as open code.
    ///
    /// Writes made by `work` are not recorded. It drives the transaction from
    /// the open side instead: it can start non-scoped transactions, enter
    /// closed nests and abort. The work may run again on retry.
    pub fn transact_then_open<F>(&self, mut work: F) -> TransactionResult
    where
        F: FnMut(),
    {
        self.transact(|| self.open(&mut work))
    }

    // Never inlined: the local below marks the boundary between the caller's
    // frames and the frames the transaction will not outlive.
    #[inline(never)]
    fn transact_dyn(&self, work: &mut dyn FnMut() -> TxResult<()>) -> TransactionResult {
        match self.status.get() {
            ContextStatus::Committing => {
                return self.refuse_transact(TransactionResult::AbortedByTransactInOnCommit);
            }
            status if status.is_aborting() => {
                return self.refuse_transact(TransactionResult::AbortedByTransactInOnAbort);
            }
            _ => {}
        }

        if !self.enabled.get().is_enabled() {
            let result = work();
            debug_assert!(result.is_ok(), "work aborted while the runtime is disabled");
            return TransactionResult::Committed;
        }

        let frame = 0u8;
        let marker = frame_address(&frame);
        let is_nested = !self.transactions.borrow().is_empty();
        if !is_nested {
            self.capture_stack_range(marker);
        }

        let id = self.push_transaction(true, marker);
        let nest = CallNest::transaction(id, marker);
        self.nests.borrow_mut().push(nest);
        let was_closed = self.in_closed.replace(true);

        let result = self.run_attempts(id, nest, work, is_nested);

        self.in_closed.set(was_closed);
        let popped = self.nests.borrow_mut().pop();
        debug_assert_eq!(popped.map(|n| n.kind()), Some(NestKind::Transaction(id)));
        self.pop_transaction(id);
        self.finish_scope(id, result, is_nested)
    }

    fn run_attempts(
        &self,
        id: TransactionId,
        nest: CallNest,
        work: &mut dyn FnMut() -> TxResult<()>,
        is_nested: bool,
    ) -> TransactionResult {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.status.set(ContextStatus::OnTrack);
            nest.try_run(work, || self.status.get());
            self.assert_current(id);

            let status = self.status.get();
            if status == ContextStatus::OnTrack {
                if attempt == 1 && self.retry.get().should_retry(is_nested) {
                    debug!(%id, "forcing a retry");
                    self.status.set(ContextStatus::AbortedByRequest);
                    self.rollback_current();
                    self.stats.record_retry();
                    continue;
                }
                if self.commit_current(is_nested) {
                    return TransactionResult::Committed;
                }
                self.stats.record_retry();
                continue;
            }

            // Rolled back at the abort point already; this catches aborts
            // performed without throwing and is a no-op otherwise.
            self.rollback_current();
            match status.abort_result() {
                Some(result) => return result,
                None => {
                    debug!(%id, attempt, %status, "retrying transaction");
                    self.stats.record_retry();
                }
            }
        }
    }

    /// Commits the current transaction. Only the outermost commit can fail.
    fn commit_current(&self, is_nested: bool) -> bool {
        if is_nested {
            self.merge_current_into_parent();
            return true;
        }

        let mut txn = self.detach_current();
        self.status.set(ContextStatus::Committing);
        let gate = Rc::clone(&self.gate.borrow());
        let committed = txn.commit_outermost(&*gate);
        self.transactions.borrow_mut().push(txn);

        if !committed {
            debug!("commit gate refused, rolling back");
            self.status.set(ContextStatus::AbortedByFailedLockAcquisition);
            self.rollback_current();
        }
        committed
    }

    fn merge_current_into_parent(&self) {
        let mut transactions = self.transactions.borrow_mut();
        let len = transactions.len();
        assert!(len >= 2, "nested commit without a parent transaction");
        let (parents, child) = transactions.split_at_mut(len - 1);
        let parent = &mut parents[len - 2];
        let dropped = child[0].commit_into(parent);
        trace!(
            child = %child[0].id(),
            parent = %parent.id(),
            dropped,
            "merged nested transaction"
        );
    }

    fn finish_scope(
        &self,
        id: TransactionId,
        result: TransactionResult,
        is_nested: bool,
    ) -> TransactionResult {
        match result {
            TransactionResult::Committed => self.stats.record_commit(),
            aborted => self.stats.record_abort(aborted),
        }
        debug!(%id, %result, nested = is_nested, "transaction finished");

        if !is_nested {
            self.status.set(ContextStatus::Idle);
            self.stack_range.set(StackRange::EMPTY);
        } else if result == TransactionResult::AbortedByCascade {
            self.status.set(ContextStatus::AbortedByCascade);
            self.rollback_current();
        } else {
            self.status.set(ContextStatus::OnTrack);
        }
        result
    }

    fn refuse_transact(&self, result: TransactionResult) -> TransactionResult {
        warn!(%result, "transaction started from a commit or abort task");
        self.stats.record_abort(result);
        result
    }

    /// Captures the native stack for an outermost transaction.
    fn capture_stack_range(&self, marker: usize) {
        let range = match self.stack_bounds.thread_stack() {
            Some(range) if range.low < marker && marker <= range.high => range,
            reported => {
                let estimate =
                    StackRange::new(marker.saturating_sub(self.stack_size_hint), marker);
                trace!(?reported, %estimate, "estimating stack bounds");
                estimate
            }
        };
        self.stack_range.set(range);
    }

    fn push_transaction(&self, is_scoped: bool, marker: usize) -> TransactionId {
        let id = self.next_transaction_id();
        let range = StackRange::new(self.stack_range.get().low, marker);
        let mut transactions = self.transactions.borrow_mut();
        transactions.push(Transaction::new(id, is_scoped, range));
        self.stats.record_transaction_start();
        debug!(%id, is_scoped, depth = transactions.len(), stack = %range, "transaction started");
        id
    }

    fn pop_transaction(&self, id: TransactionId) {
        let mut txn = self.detach_current();
        assert!(
            txn.id() == id,
            "{} is still running when {id} finishes; a start_transaction was not matched",
            txn.id()
        );
        debug_assert!(txn.is_clean(), "{id} finished with pending state");
        txn.set_done();
    }

    fn assert_current(&self, id: TransactionId) {
        let current = self.transactions.borrow().last().map(Transaction::id);
        assert!(
            current == Some(id),
            "{id} returned while {current:?} is current; a start_transaction was not matched"
        );
    }

    fn detach_current(&self) -> Transaction {
        let txn = self
            .transactions
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| panic!("no transaction is running"));
        debug_assert!(!txn.is_done());
        txn
    }

    /// Rolls back the current transaction without holding any borrow while
    /// its abort tasks run.
    fn rollback_current(&self) {
        let mut txn = self.detach_current();
        txn.abort_without_throwing();
        self.transactions.borrow_mut().push(txn);
    }

    // === Closed and open regions ===

    /// Runs closed code entered from open code.
    ///
    /// An abort raised inside `work` stops at this boundary; the returned
    /// status tells the open caller what happened.
    ///
    /// # Panics
    ///
    /// Panics unless a transaction is on track.
    pub fn call_closed_nest<F>(&self, mut work: F) -> ContextStatus
    where
        F: FnMut() -> TxResult<()>,
    {
        self.call_closed_nest_dyn(&mut work)
    }

    #[inline(never)]
    fn call_closed_nest_dyn(&self, work: &mut dyn FnMut() -> TxResult<()>) -> ContextStatus {
        let status = self.status.get();
        assert!(
            status == ContextStatus::OnTrack,
            "closed nest entered with status {status}"
        );

        let frame = 0u8;
        let marker = frame_address(&frame);
        let nest = CallNest::closed(marker);
        self.nests.borrow_mut().push(nest);
        let was_closed = self.in_closed.replace(true);
        self.stats.record_closed_nest();
        trace!(marker = format_args!("{marker:#x}"), "entered closed nest");

        nest.try_run(work, || self.status.get());

        self.in_closed.set(was_closed);
        let popped = self.nests.borrow_mut().pop();
        debug_assert_eq!(popped.map(|n| n.kind()), Some(NestKind::Closed));
        self.status.get()
    }

    /// Runs open code: writes made by `work` are not expected to be recorded.
    ///
    /// If the transaction is aborting when `work` returns, the abort is
    /// raised again to the closed caller.
    pub fn open<R>(&self, work: impl FnOnce() -> R) -> TxResult<R> {
        let was_closed = self.in_closed.replace(false);
        let value = work();
        self.in_closed.set(was_closed);

        match self.status.get() {
            status if status.is_aborting() => Err(Aborted::new(status)),
            _ => Ok(value),
        }
    }

    // === Non-scoped transactions ===

    /// Starts a transaction that is not bound to a single call.
    ///
    /// Returns false if no transaction is on track.
    ///
    /// # Panics
    ///
    /// Panics when called from closed code.
    #[inline(never)]
    pub fn start_transaction(&self) -> bool {
        self.assert_open_caller("start_transaction");
        let status = self.status.get();
        if status != ContextStatus::OnTrack {
            debug!(%status, "start_transaction outside an on-track transaction");
            return false;
        }
        let frame = 0u8;
        self.push_transaction(false, frame_address(&frame));
        true
    }

    /// Commits the transaction started by [`start_transaction`] into its
    /// parent.
    ///
    /// # Panics
    ///
    /// Panics unless the current transaction is an on-track non-scoped one,
    /// or when called from closed code.
    ///
    /// [`start_transaction`]: Context::start_transaction
    pub fn commit_transaction(&self) -> TransactionResult {
        self.assert_open_caller("commit_transaction");
        let status = self.status.get();
        assert!(
            status == ContextStatus::OnTrack,
            "commit_transaction with status {status}"
        );
        let id = self.current_non_scoped("commit_transaction");

        self.merge_current_into_parent();
        self.pop_transaction(id);
        self.stats.record_commit();
        debug!(%id, "non-scoped transaction committed");
        TransactionResult::Committed
    }

    /// Aborts the current transaction.
    ///
    /// From closed code (`is_closed`) the abort is raised and propagates to
    /// the nearest boundary; a non-scoped transaction then stays current until
    /// [`clear_transaction_status`] and a later commit or abort resolve it.
    /// From open code the result is returned: a scoped transaction resolves
    /// when its closure returns, a non-scoped one resolves immediately.
    ///
    /// # Panics
    ///
    /// Panics unless a transaction is on track.
    ///
    /// [`clear_transaction_status`]: Context::clear_transaction_status
    pub fn abort_transaction(
        &self,
        is_closed: bool,
        is_cascading: bool,
    ) -> TxResult<TransactionResult> {
        let status = self.status.get();
        assert!(
            status == ContextStatus::OnTrack,
            "abort_transaction with status {status}"
        );
        let (status, result) = if is_cascading {
            (ContextStatus::AbortedByCascade, TransactionResult::AbortedByCascade)
        } else {
            (ContextStatus::AbortedByRequest, TransactionResult::AbortedByRequest)
        };

        self.status.set(status);
        self.rollback_current();
        if is_closed {
            return Err(Aborted::new(status));
        }

        let (id, is_scoped) = {
            let transactions = self.transactions.borrow();
            let txn = Self::top_ref(&transactions);
            (txn.id(), txn.is_scoped())
        };
        if is_scoped {
            return Ok(result);
        }

        self.pop_transaction(id);
        self.stats.record_abort(result);
        debug!(%id, %result, "non-scoped transaction aborted");
        if is_cascading {
            self.rollback_current();
        } else {
            self.status.set(ContextStatus::OnTrack);
        }
        Ok(result)
    }

    /// Returns an aborted transaction to the on-track state so it can keep
    /// running.
    ///
    /// # Panics
    ///
    /// Panics unless the context is aborting, or when called from closed
    /// code.
    pub fn clear_transaction_status(&self) {
        self.assert_open_caller("clear_transaction_status");
        let status = self.status.get();
        assert!(status.is_aborting(), "clear_transaction_status with status {status}");
        self.status.set(ContextStatus::OnTrack);
    }

    // === Aborts ===

    /// Aborts the current transaction and raises the abort.
    ///
    /// The write log is undone and abort tasks have run by the time this
    /// returns. Propagate the error with `?`.
    ///
    /// # Panics
    ///
    /// Panics outside a transaction.
    pub fn abort_by_request_and_throw(&self) -> TxResult<Infallible> {
        Err(self.abort_with(ContextStatus::AbortedByRequest))
    }

    /// Aborts because the code cannot run transactionally.
    ///
    /// # Panics
    ///
    /// Panics outside a transaction.
    pub fn abort_by_language_and_throw(&self) -> TxResult<Infallible> {
        Err(self.abort_with(ContextStatus::AbortedByLanguage))
    }

    /// Aborts the current transaction without raising the abort.
    ///
    /// The transaction resolves to [`TransactionResult::AbortedByRequest`]
    /// once its closure returns.
    ///
    /// # Panics
    ///
    /// Panics outside a transaction.
    pub fn abort_by_request_without_throwing(&self) {
        self.abort_with(ContextStatus::AbortedByRequest);
    }

    /// Aborts by request if a transaction is on track.
    pub fn abort_if_transactional(&self) -> TxResult<()> {
        if self.is_transactional() {
            self.abort_by_request_and_throw()?;
        }
        Ok(())
    }

    /// Aborts by request if closed code of an on-track transaction is running.
    pub fn abort_if_closed(&self) -> TxResult<()> {
        if self.is_closed() {
            self.abort_by_request_and_throw()?;
        }
        Ok(())
    }

    fn abort_with(&self, status: ContextStatus) -> Aborted {
        let current = self.status.get();
        if current.is_aborting() {
            return Aborted::new(current);
        }
        assert!(
            current == ContextStatus::OnTrack,
            "abort outside a transaction (status {current})"
        );

        if status == ContextStatus::AbortedByLanguage && self.ensure_on_abort_by_language.get() {
            warn!("transaction aborted by language");
        }
        debug!(%status, "aborting transaction");
        self.status.set(status);
        self.rollback_current();
        Aborted::new(status)
    }

    fn assert_open_caller(&self, operation: &str) {
        assert!(!self.in_closed.get(), "{operation} called from closed code");
    }

    fn current_non_scoped(&self, operation: &str) -> TransactionId {
        let transactions = self.transactions.borrow();
        let txn = Self::top_ref(&transactions);
        assert!(
            !txn.is_scoped() && transactions.len() >= 2,
            "{operation} without a matching start_transaction"
        );
        txn.id()
    }

    fn top_ref(transactions: &[Transaction]) -> &Transaction {
        transactions
            .last()
            .unwrap_or_else(|| panic!("no transaction is running"))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, ContextStatus, RetryMode, RuntimeConfig, TransactionResult};
    use std::cell::Cell;

    #[test]
    fn scenario_a_abort_restores() {
        let ctx = Context::default();
        let mut value = 7i32;
        let result = ctx.transact(|| {
            // SAFETY: `value` outlives the transaction.
            unsafe { ctx.write(&mut value, 42)? };
            ctx.abort_by_request_and_throw()?;
            Ok(())
        });
        assert_eq!(result, TransactionResult::AbortedByRequest);
        assert_eq!(value, 7);
        assert_eq!(ctx.status(), ContextStatus::Idle);
    }

    #[test]
    fn scenario_b_commit_keeps() {
        let ctx = Context::default();
        let mut value = 7i32;
        // SAFETY: `value` outlives the transaction.
        let result = ctx.transact(|| unsafe { ctx.write(&mut value, 42) });
        assert_eq!(result, TransactionResult::Committed);
        assert_eq!(value, 42);
        assert_eq!(ctx.transaction_depth(), 0);
        assert_eq!(ctx.nest_depth(), 0);
    }

    #[test]
    fn without_throwing_resolves_on_return() {
        let ctx = Context::default();
        let mut value = 1u8;
        let after = Cell::new(false);
        let result = ctx.transact(|| {
            // SAFETY: `value` outlives the transaction.
            unsafe { ctx.write(&mut value, 2)? };
            ctx.abort_by_request_without_throwing();
            after.set(true);
            Ok(())
        });
        assert_eq!(result, TransactionResult::AbortedByRequest);
        assert!(after.get());
        assert_eq!(value, 1);
    }

    #[test]
    fn writes_after_abort_fail() {
        let ctx = Context::default();
        let mut value = 1u8;
        let second = Cell::new(None);
        let result = ctx.transact(|| {
            ctx.abort_by_request_without_throwing();
            // SAFETY: `value` outlives the transaction.
            second.set(Some(unsafe { ctx.write(&mut value, 3) }.is_err()));
            Ok(())
        });
        assert_eq!(result, TransactionResult::AbortedByRequest);
        assert_eq!(second.get(), Some(true));
    }

    #[test]
    fn forced_retry_runs_work_twice() {
        let ctx = Context::new(RuntimeConfig::new().retry(RetryMode::RetryNonNested));
        let runs = Cell::new(0);
        let mut value = 0u32;
        let result = ctx.transact(|| {
            runs.set(runs.get() + 1);
            let next = value + 1;
            // SAFETY: `value` outlives the transaction.
            unsafe { ctx.write(&mut value, next) }
        });
        assert_eq!(result, TransactionResult::Committed);
        assert_eq!(runs.get(), 2);
        assert_eq!(value, 1);
        assert_eq!(ctx.stats().retries(), 1);
    }

    #[test]
    #[should_panic(expected = "abort outside a transaction")]
    fn abort_outside_transaction_panics() {
        let ctx = Context::default();
        let _ = ctx.abort_by_request_and_throw();
    }

    #[test]
    #[should_panic(expected = "was expected to commit")]
    fn commit_panics_on_abort() {
        let ctx = Context::default();
        ctx.commit(|| {
            ctx.abort_by_request_and_throw()?;
            Ok(())
        });
    }

    #[test]
    #[should_panic(expected = "start_transaction was not matched")]
    fn unmatched_start_transaction_panics() {
        let ctx = Context::default();
        let _ = ctx.transact(|| {
            assert!(ctx.open(|| ctx.start_transaction())?);
            Ok(())
        });
    }

    #[test]
    #[should_panic(expected = "start_transaction called from closed code")]
    fn start_transaction_from_closed_code_panics() {
        let ctx = Context::default();
        let _ = ctx.transact(|| {
            ctx.start_transaction();
            Ok(())
        });
    }

    #[test]
    #[should_panic(expected = "commit_transaction called from closed code")]
    fn commit_transaction_from_closed_code_panics() {
        let ctx = Context::default();
        let _ = ctx.transact(|| {
            assert!(ctx.open(|| ctx.start_transaction())?);
            let _ = ctx.call_closed_nest(|| {
                let _ = ctx.commit_transaction();
                Ok(())
            });
            Ok(())
        });
    }

    #[test]
    #[should_panic(expected = "clear_transaction_status called from closed code")]
    fn clear_transaction_status_from_closed_code_panics() {
        let ctx = Context::default();
        let _ = ctx.transact(|| {
            ctx.abort_by_request_without_throwing();
            ctx.clear_transaction_status();
            Ok(())
        });
    }

    #[test]
    fn transact_then_open_runs_work_as_open_code() {
        let ctx = Context::default();
        let seen = Cell::new(None);
        let result = ctx.transact_then_open(|| {
            seen.set(Some((ctx.is_transactional(), ctx.is_closed())));
        });
        assert_eq!(result, TransactionResult::Committed);
        assert_eq!(seen.get(), Some((true, false)));
        assert_eq!(ctx.status(), ContextStatus::Idle);
    }

    #[test]
    fn transact_then_open_drives_non_scoped_transactions() {
        let ctx = Context::default();
        let value = Cell::new(1u32);
        let result = ctx.transact_then_open(|| {
            assert!(ctx.start_transaction());
            let status = ctx.call_closed_nest(|| {
                // SAFETY: `value` outlives the transaction.
                unsafe { ctx.record_write_of(&value)? };
                value.set(2);
                Ok(())
            });
            assert_eq!(status, ContextStatus::OnTrack);
            assert_eq!(ctx.commit_transaction(), TransactionResult::Committed);
        });
        assert_eq!(result, TransactionResult::Committed);
        assert_eq!(value.get(), 2);
    }

    #[test]
    fn transact_then_open_reports_open_abort() {
        let ctx = Context::default();
        let value = Cell::new(1u32);
        let result = ctx.transact_then_open(|| {
            let status = ctx.call_closed_nest(|| {
                // SAFETY: `value` outlives the transaction.
                unsafe { ctx.record_write_of(&value)? };
                value.set(2);
                Ok(())
            });
            assert_eq!(status, ContextStatus::OnTrack);
            let aborted = ctx.abort_transaction(false, false);
            assert_eq!(aborted, Ok(TransactionResult::AbortedByRequest));
        });
        assert_eq!(result, TransactionResult::AbortedByRequest);
        assert_eq!(value.get(), 1);
    }

    #[test]
    fn start_transaction_outside_is_refused() {
        let ctx = Context::default();
        assert!(!ctx.start_transaction());
    }
}

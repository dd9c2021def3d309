//! The per-thread transaction context.
//!
//! A [`Context`] owns the transaction stack and the call-nest stack and drives
//! the state machine
//!
//! ```text
//! Idle -> OnTrack -> Committing -> Idle            (outermost commit)
//!         OnTrack -> AbortedBy* -> Idle | OnTrack  (abort, outermost | nested)
//! ```
//!
//! It is deliberately `!Send` and `!Sync`: every call must come from the
//! thread that owns it. [`crate::api`] keeps one per thread.
//!
//! # Example
//!
//! ```rust
//! use rewind_core::{Context, RuntimeConfig, TransactionResult};
//!
//! let ctx = Context::new(RuntimeConfig::default());
//! let mut balance = 100i64;
//!
//! let result = ctx.transact(|| {
//!     // SAFETY: `balance` outlives the transaction.
//!     unsafe { ctx.write(&mut balance, 40)? };
//!     ctx.abort_by_request_and_throw()?;
//!     Ok(())
//! });
//!
//! assert_eq!(result, TransactionResult::AbortedByRequest);
//! assert_eq!(balance, 100);
//! ```

mod transact;

use crate::config::{EnabledState, RetryMode, RuntimeConfig};
use crate::error::{Aborted, TxResult};
use crate::gate::{AlwaysCommit, CommitGate};
use crate::stack::{PlatformStackBounds, StackBounds};
use crate::stats::RuntimeStats;
use crate::transaction::{CallNest, RecordOutcome, Transaction};
use crate::types::{ContextStatus, StackRange, TaskKey, TransactionId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-thread runtime state.
pub struct Context {
    status: Cell<ContextStatus>,
    /// Innermost transaction last.
    transactions: RefCell<Vec<Transaction>>,
    /// Innermost nest last.
    nests: RefCell<Vec<CallNest>>,
    /// Native stack of the owning thread, captured per outermost transaction.
    stack_range: Cell<StackRange>,
    /// True while closed (transactional) code runs.
    in_closed: Cell<bool>,
    next_id: Cell<TransactionId>,
    enabled: Cell<EnabledState>,
    retry: Cell<RetryMode>,
    ensure_on_abort_by_language: Cell<bool>,
    stack_size_hint: usize,
    stats: Arc<RuntimeStats>,
    gate: RefCell<Rc<dyn CommitGate>>,
    stack_bounds: Box<dyn StackBounds>,
}

impl Context {
    /// Creates a context that reads stack bounds from the platform.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_stack_bounds(config, Box::new(PlatformStackBounds))
    }

    /// Creates a context with a custom stack-bounds source.
    pub fn with_stack_bounds(config: RuntimeConfig, stack_bounds: Box<dyn StackBounds>) -> Self {
        Self {
            status: Cell::new(ContextStatus::Idle),
            transactions: RefCell::new(Vec::new()),
            nests: RefCell::new(Vec::new()),
            stack_range: Cell::new(StackRange::EMPTY),
            in_closed: Cell::new(false),
            next_id: Cell::new(TransactionId::new(1)),
            enabled: Cell::new(config.enabled),
            retry: Cell::new(config.retry),
            ensure_on_abort_by_language: Cell::new(config.ensure_on_abort_by_language),
            stack_size_hint: config.stack_size_hint,
            stats: Arc::new(RuntimeStats::new()),
            gate: RefCell::new(Rc::new(AlwaysCommit)),
            stack_bounds,
        }
    }

    // === Configuration ===

    /// Returns the current configuration.
    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig::new()
            .enabled(self.enabled.get())
            .retry(self.retry.get())
            .stack_size_hint(self.stack_size_hint)
            .ensure_on_abort_by_language(self.ensure_on_abort_by_language.get())
    }

    /// Returns the enablement state.
    pub fn enabled_state(&self) -> EnabledState {
        self.enabled.get()
    }

    /// Changes the enablement state.
    ///
    /// Refused (returns false) when the current state is forced or a
    /// transaction is running.
    pub fn set_enabled_state(&self, state: EnabledState) -> bool {
        let current = self.enabled.get();
        if current.is_forced() {
            warn!(%current, requested = %state, "enabled state is forced, ignoring change");
            return false;
        }
        if self.status.get() != ContextStatus::Idle {
            warn!(requested = %state, "cannot change enabled state inside a transaction");
            return false;
        }
        self.enabled.set(state);
        debug!(%state, "enabled state changed");
        true
    }

    /// Returns the forced retry mode.
    pub fn retry_mode(&self) -> RetryMode {
        self.retry.get()
    }

    /// Sets the forced retry mode.
    pub fn set_retry_mode(&self, mode: RetryMode) {
        self.retry.set(mode);
    }

    /// Sets whether aborts by language emit a warning.
    pub fn set_ensure_on_abort_by_language(&self, value: bool) {
        self.ensure_on_abort_by_language.set(value);
    }

    /// Installs the gate consulted before every outermost commit.
    pub fn set_commit_gate(&self, gate: impl CommitGate + 'static) {
        *self.gate.borrow_mut() = Rc::new(gate);
    }

    /// Restores the gate that admits every commit.
    pub fn reset_commit_gate(&self) {
        self.set_commit_gate(AlwaysCommit);
    }

    /// Returns the shared statistics.
    pub fn stats(&self) -> Arc<RuntimeStats> {
        Arc::clone(&self.stats)
    }

    // === Queries ===

    /// Returns the current status.
    pub fn status(&self) -> ContextStatus {
        self.status.get()
    }

    /// Returns true while a transaction runs normally.
    pub fn is_transactional(&self) -> bool {
        self.status.get() == ContextStatus::OnTrack
    }

    /// Returns true while closed code of an on-track transaction runs.
    pub fn is_closed(&self) -> bool {
        self.in_closed.get() && self.is_transactional()
    }

    /// Returns true while commit tasks or abort processing run.
    pub fn is_committing_or_aborting(&self) -> bool {
        let status = self.status.get();
        status == ContextStatus::Committing || status.is_aborting()
    }

    /// Returns true while a transaction is aborting.
    pub fn is_aborting(&self) -> bool {
        self.status.get().is_aborting()
    }

    /// Returns true if `address` lies in stack frames the current transaction
    /// will not outlive.
    pub fn is_on_current_transaction_stack(&self, address: *const u8) -> bool {
        self.transactions
            .borrow()
            .last()
            .is_some_and(|txn| txn.stack_range().contains(address as usize))
    }

    /// Returns the number of live transactions.
    pub fn transaction_depth(&self) -> usize {
        self.transactions.borrow().len()
    }

    /// Returns the number of live call nests.
    pub fn nest_depth(&self) -> usize {
        self.nests.borrow().len()
    }

    /// Returns the number of write-log entries of the current transaction.
    pub fn write_log_len(&self) -> usize {
        self.transactions
            .borrow()
            .last()
            .map_or(0, |txn| txn.write_log().len())
    }

    // === Write and allocation notifications ===

    /// Records `[address, address + size)` before the caller overwrites it.
    ///
    /// Does nothing outside an on-track transaction. Fails with the current
    /// status while the transaction is aborting, so a caller cannot keep
    /// mutating memory of a transaction that is already rolled back.
    ///
    /// # Safety
    ///
    /// The range must be valid for reads now and for writes until the
    /// outermost transaction resolves. Writes to it must not be observed
    /// through references created before the transaction aborts.
    ///
    /// # Panics
    ///
    /// Panics if a non-scoped transaction writes to open-code stack frames.
    pub unsafe fn record_write(&self, address: *const u8, size: usize) -> TxResult<()> {
        let status = self.status.get();
        if status != ContextStatus::OnTrack {
            return match status.is_aborting() {
                true => Err(Aborted::new(status)),
                false => Ok(()),
            };
        }
        if size == 0 {
            return Ok(());
        }

        let address = address as usize;
        let mut transactions = self.transactions.borrow_mut();
        let txn = Self::top(&mut transactions);
        if self.is_exempt_stack_write(txn, address) {
            self.stats.record_stack_skip();
            return Ok(());
        }

        // SAFETY: forwarded from the caller.
        match unsafe { txn.record_write(address, size) } {
            RecordOutcome::Logged { entries } => {
                debug_assert!(entries > 0);
                self.stats.record_logged_write(size);
            }
            RecordOutcome::Duplicate => self.stats.record_duplicate_skip(),
            RecordOutcome::NewMemory => self.stats.record_new_memory_skip(),
        }
        Ok(())
    }

    /// Writes `value` into `target`, recording the old value first.
    ///
    /// # Safety
    ///
    /// `target` must stay allocated, and must not move, until the outermost
    /// transaction resolves: an abort writes the old value back through its
    /// address. A local of a frame that returns before then, or an element of
    /// a `Vec` that reallocates, breaks this.
    ///
    /// ```compile_fail
    /// use rewind_core::Context;
    ///
    /// let ctx = Context::default();
    /// let mut value = 1u32;
    /// let _ = ctx.transact(|| ctx.write(&mut value, 2));
    /// ```
    pub unsafe fn write<T: Copy>(&self, target: &mut T, value: T) -> TxResult<()> {
        let address = (target as *mut T).cast::<u8>().cast_const();
        // SAFETY: `target` covers `size_of::<T>()` bytes and outlives the
        // transaction per the caller; `T: Copy` has no destructor a restore
        // could skip.
        unsafe { self.record_write(address, std::mem::size_of::<T>())? };
        *target = value;
        Ok(())
    }

    /// Records the whole of `target` before it is mutated in place, for
    /// example through a `Cell`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Context::write`]: `target` must stay allocated and
    /// in place until the outermost transaction resolves.
    pub unsafe fn record_write_of<T: ?Sized>(&self, target: &T) -> TxResult<()> {
        let address = (target as *const T).cast::<u8>();
        // SAFETY: `target` covers `size_of_val(target)` bytes and outlives the
        // transaction per the caller.
        unsafe { self.record_write(address, std::mem::size_of_val(target)) }
    }

    /// Reports memory freshly allocated by transactional code.
    ///
    /// # Panics
    ///
    /// Panics if the range overlaps memory already reported.
    pub fn did_allocate(&self, address: *const u8, size: usize) {
        if !self.is_transactional() {
            return;
        }
        Self::top(&mut self.transactions.borrow_mut()).did_allocate(address as usize, size);
        self.stats.record_allocation();
    }

    /// Reports that transactional code releases `address`.
    ///
    /// # Panics
    ///
    /// Panics if the current transaction allocated the memory: the release
    /// must be deferred to a commit task instead.
    pub fn did_free(&self, address: *const u8) {
        if !self.is_transactional() {
            return;
        }
        Self::top(&mut self.transactions.borrow_mut()).did_free(address as usize);
    }

    // === Deferred tasks ===

    /// Runs `task` when the outermost transaction commits.
    ///
    /// Outside closed transactional code the task runs immediately; while
    /// aborting it is dropped.
    pub fn on_commit(&self, task: impl FnOnce() + 'static) {
        if self.is_closed() {
            Self::top(&mut self.transactions.borrow_mut()).defer_until_commit(Box::new(task));
        } else if !self.is_aborting() {
            task();
        }
    }

    /// Runs `task` if the current transaction aborts.
    ///
    /// Dropped outside closed transactional code.
    pub fn on_abort(&self, task: impl FnOnce() + 'static) {
        if self.is_closed() {
            Self::top(&mut self.transactions.borrow_mut()).defer_until_abort(Box::new(task));
        }
    }

    /// Registers an abort task that can be cancelled through `key`.
    ///
    /// Dropped outside closed transactional code.
    pub fn push_on_abort_handler(&self, key: TaskKey, task: impl FnOnce() + 'static) {
        if self.is_closed() {
            Self::top(&mut self.transactions.borrow_mut())
                .push_defer_until_abort_handler(key, Box::new(task));
        }
    }

    /// Cancels the most recent abort handler pushed with `key`.
    ///
    /// Returns false outside closed transactional code.
    ///
    /// # Panics
    ///
    /// Panics in closed code if the current transaction holds no handler
    /// with `key`.
    pub fn pop_on_abort_handler(&self, key: TaskKey) -> bool {
        if !self.is_closed() {
            return false;
        }
        let popped =
            Self::top(&mut self.transactions.borrow_mut()).pop_defer_until_abort_handler(key);
        assert!(popped, "no abort handler registered for {key}");
        true
    }

    /// Cancels every abort handler pushed with `key`.
    ///
    /// Returns false if none was registered or outside closed code.
    pub fn pop_all_on_abort_handlers(&self, key: TaskKey) -> bool {
        if !self.is_closed() {
            return false;
        }
        Self::top(&mut self.transactions.borrow_mut()).pop_all_defer_until_abort_handlers(key)
    }

    // === Internals ===

    fn top(transactions: &mut [Transaction]) -> &mut Transaction {
        transactions
            .last_mut()
            .unwrap_or_else(|| panic!("transactional status without a transaction"))
    }

    fn next_transaction_id(&self) -> TransactionId {
        let id = self.next_id.get();
        self.next_id.set(id.next());
        id
    }

    /// Stack rule for writes.
    ///
    /// A scoped transaction skips its own frames. A non-scoped transaction
    /// skips frames of the innermost closed nest entered after it started,
    /// and must never touch the open-code frames between that nest and its
    /// start.
    fn is_exempt_stack_write(&self, txn: &Transaction, address: usize) -> bool {
        let range = txn.stack_range();
        if txn.is_scoped() {
            return range.contains(address);
        }
        let closed = self.closed_stack_address();
        if closed <= range.high && range.low <= address && address < closed {
            return true;
        }
        assert!(
            !range.contains(address),
            "{} wrote to open-code stack address {address:#x} inside {range}",
            txn.id()
        );
        false
    }

    /// Marker of the innermost nest, or the top of the address space.
    fn closed_stack_address(&self) -> usize {
        self.nests
            .borrow()
            .last()
            .map_or(usize::MAX, CallNest::stack_address)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("status", &self.status.get())
            .field("transactions", &self.transaction_depth())
            .field("nests", &self.nest_depth())
            .field("stack_range", &self.stack_range.get())
            .field("in_closed", &self.in_closed.get())
            .field("enabled", &self.enabled.get())
            .field("retry", &self.retry.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionResult;

    static_assertions::assert_not_impl_any!(Context: Send, Sync);

    #[test]
    fn idle_context() {
        let ctx = Context::default();
        assert_eq!(ctx.status(), ContextStatus::Idle);
        assert!(!ctx.is_transactional());
        assert!(!ctx.is_closed());
        assert!(!ctx.is_committing_or_aborting());
        assert_eq!(ctx.transaction_depth(), 0);
        assert_eq!(ctx.write_log_len(), 0);
    }

    #[test]
    fn writes_outside_transactions_are_plain_writes() {
        let ctx = Context::default();
        let mut value = 1u32;
        // SAFETY: no transaction is running.
        unsafe { ctx.write(&mut value, 2) }.unwrap();
        assert_eq!(value, 2);
        assert_eq!(ctx.stats().writes_logged(), 0);
    }

    #[test]
    fn on_commit_outside_transaction_runs_now() {
        let ctx = Context::default();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        ctx.on_commit(move || flag.set(true));
        assert!(ran.get());
    }

    #[test]
    fn on_abort_outside_transaction_is_dropped() {
        let ctx = Context::default();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        ctx.on_abort(move || flag.set(true));
        ctx.push_on_abort_handler(TaskKey::new(1), || {});
        assert!(!ctx.pop_on_abort_handler(TaskKey::new(1)));
        assert!(!ran.get());
    }

    #[test]
    fn forced_state_refuses_changes() {
        let ctx = Context::new(RuntimeConfig::new().enabled(EnabledState::ForcedEnabled));
        assert!(!ctx.set_enabled_state(EnabledState::Disabled));
        assert_eq!(ctx.enabled_state(), EnabledState::ForcedEnabled);

        let ctx = Context::default();
        assert!(ctx.set_enabled_state(EnabledState::Disabled));
        assert_eq!(ctx.config().enabled, EnabledState::Disabled);
    }

    #[test]
    fn enabled_state_is_fixed_inside_transactions() {
        let ctx = Context::default();
        let changed = Rc::new(RefCell::new(None));
        let result = ctx.transact(|| {
            *changed.borrow_mut() = Some(ctx.set_enabled_state(EnabledState::Disabled));
            Ok(())
        });
        assert_eq!(result, TransactionResult::Committed);
        assert_eq!(*changed.borrow(), Some(false));
    }

    fn non_scoped(low: usize, high: usize) -> Transaction {
        Transaction::new(TransactionId::new(1), false, StackRange::new(low, high))
    }

    #[test]
    fn scoped_stack_rule() {
        let ctx = Context::default();
        let txn = Transaction::new(TransactionId::new(1), true, StackRange::new(0x1000, 0x2000));
        assert!(ctx.is_exempt_stack_write(&txn, 0x1000));
        assert!(ctx.is_exempt_stack_write(&txn, 0x1fff));
        assert!(!ctx.is_exempt_stack_write(&txn, 0x2000));
    }

    #[test]
    fn non_scoped_stack_rule() {
        let ctx = Context::default();
        let txn = non_scoped(0x1000, 0x2000);
        ctx.nests.borrow_mut().push(CallNest::closed(0x1800));

        assert!(ctx.is_exempt_stack_write(&txn, 0x1400));
        assert!(!ctx.is_exempt_stack_write(&txn, 0x2400));
    }

    #[test]
    #[should_panic(expected = "wrote to open-code stack")]
    fn non_scoped_write_to_open_frames_panics() {
        let ctx = Context::default();
        let txn = non_scoped(0x1000, 0x2000);
        ctx.nests.borrow_mut().push(CallNest::closed(0x1800));
        ctx.is_exempt_stack_write(&txn, 0x1900);
    }

    #[test]
    #[should_panic(expected = "wrote to open-code stack")]
    fn non_scoped_without_closed_nest_panics() {
        let ctx = Context::default();
        let txn = non_scoped(0x1000, 0x2000);
        ctx.is_exempt_stack_write(&txn, 0x1400);
    }

    #[test]
    fn debug_output_names_status() {
        let ctx = Context::default();
        assert!(format!("{ctx:?}").contains("Idle"));
    }
}

//! Runtime statistics.
//!
//! Counters for transaction outcomes and write-recording decisions.
//!
//! # Usage
//!
//! ```rust
//! use rewind_core::{Context, RuntimeConfig, TransactionResult};
//!
//! let ctx = Context::new(RuntimeConfig::default());
//! let result = ctx.transact(|| Ok(()));
//! assert_eq!(result, TransactionResult::Committed);
//!
//! let stats = ctx.stats().snapshot();
//! assert_eq!(stats.transactions_committed, 1);
//! ```

use crate::types::TransactionResult;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime statistics.
///
/// Counters are atomic so a snapshot can be taken from another thread while
/// the owning thread runs transactions. Values only grow until [`reset`].
///
/// [`reset`]: RuntimeStats::reset
#[derive(Debug, Default)]
pub struct RuntimeStats {
    // Transaction counters
    /// Transactions started, nested and non-scoped ones included.
    transactions_started: AtomicU64,
    /// Transactions that committed.
    transactions_committed: AtomicU64,
    /// Transactions aborted by request.
    aborted_by_request: AtomicU64,
    /// Transactions aborted by language.
    aborted_by_language: AtomicU64,
    /// Transactions aborted by cascade.
    aborted_by_cascade: AtomicU64,
    /// Transactions refused because they started from a commit or abort task.
    transact_in_handler: AtomicU64,
    /// Attempts rolled back and run again.
    retries: AtomicU64,

    // Write counters
    /// Write-log entries appended.
    writes_logged: AtomicU64,
    /// Bytes saved into write logs.
    bytes_logged: AtomicU64,
    /// Writes skipped because they hit the transaction's own stack.
    writes_skipped_stack: AtomicU64,
    /// Writes skipped because the span was already logged.
    writes_skipped_duplicate: AtomicU64,
    /// Writes skipped because the memory was allocated by the transaction.
    writes_skipped_new_memory: AtomicU64,

    // Misc
    /// Allocations registered with a transaction.
    allocations_tracked: AtomicU64,
    /// Closed nests entered.
    closed_nests: AtomicU64,
}

impl RuntimeStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an abort by request, language or cascade.
    pub(crate) fn record_abort(&self, result: TransactionResult) {
        let counter = match result {
            TransactionResult::AbortedByRequest => &self.aborted_by_request,
            TransactionResult::AbortedByLanguage => &self.aborted_by_language,
            TransactionResult::AbortedByCascade => &self.aborted_by_cascade,
            TransactionResult::AbortedByTransactInOnCommit
            | TransactionResult::AbortedByTransactInOnAbort => &self.transact_in_handler,
            TransactionResult::Committed => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_logged_write(&self, bytes: usize) {
        self.writes_logged.fetch_add(1, Ordering::Relaxed);
        self.bytes_logged.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_stack_skip(&self) {
        self.writes_skipped_stack.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate_skip(&self) {
        self.writes_skipped_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_new_memory_skip(&self) {
        self.writes_skipped_new_memory.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allocation(&self) {
        self.allocations_tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed_nest(&self) {
        self.closed_nests.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions aborted for any reason.
    pub fn transactions_aborted(&self) -> u64 {
        self.aborted_by_request.load(Ordering::Relaxed)
            + self.aborted_by_language.load(Ordering::Relaxed)
            + self.aborted_by_cascade.load(Ordering::Relaxed)
    }

    /// Returns the number of forced or lock-failure retries.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns the number of write-log entries appended.
    pub fn writes_logged(&self) -> u64 {
        self.writes_logged.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes saved into write logs.
    pub fn bytes_logged(&self) -> u64 {
        self.bytes_logged.load(Ordering::Relaxed)
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.transactions_started,
            &self.transactions_committed,
            &self.aborted_by_request,
            &self.aborted_by_language,
            &self.aborted_by_cascade,
            &self.transact_in_handler,
            &self.retries,
            &self.writes_logged,
            &self.bytes_logged,
            &self.writes_skipped_stack,
            &self.writes_skipped_duplicate,
            &self.writes_skipped_new_memory,
            &self.allocations_tracked,
            &self.closed_nests,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            transactions_started: load(&self.transactions_started),
            transactions_committed: load(&self.transactions_committed),
            aborted_by_request: load(&self.aborted_by_request),
            aborted_by_language: load(&self.aborted_by_language),
            aborted_by_cascade: load(&self.aborted_by_cascade),
            transact_in_handler: load(&self.transact_in_handler),
            retries: load(&self.retries),
            writes_logged: load(&self.writes_logged),
            bytes_logged: load(&self.bytes_logged),
            writes_skipped_stack: load(&self.writes_skipped_stack),
            writes_skipped_duplicate: load(&self.writes_skipped_duplicate),
            writes_skipped_new_memory: load(&self.writes_skipped_new_memory),
            allocations_tracked: load(&self.allocations_tracked),
            closed_nests: load(&self.closed_nests),
        }
    }
}

/// A point-in-time snapshot of runtime statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted by request.
    pub aborted_by_request: u64,
    /// Transactions aborted by language.
    pub aborted_by_language: u64,
    /// Transactions aborted by cascade.
    pub aborted_by_cascade: u64,
    /// Transactions refused inside commit or abort tasks.
    pub transact_in_handler: u64,
    /// Attempts rolled back and run again.
    pub retries: u64,
    /// Write-log entries appended.
    pub writes_logged: u64,
    /// Bytes saved into write logs.
    pub bytes_logged: u64,
    /// Writes skipped as transaction stack memory.
    pub writes_skipped_stack: u64,
    /// Writes skipped as already logged.
    pub writes_skipped_duplicate: u64,
    /// Writes skipped as transaction-allocated memory.
    pub writes_skipped_new_memory: u64,
    /// Allocations registered.
    pub allocations_tracked: u64,
    /// Closed nests entered.
    pub closed_nests: u64,
}

impl StatsSnapshot {
    /// Returns the number of transactions aborted for any reason.
    pub fn transactions_aborted(&self) -> u64 {
        self.aborted_by_request + self.aborted_by_language + self.aborted_by_cascade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = RuntimeStats::new();
        assert_eq!(stats.transactions_started(), 0);
        assert_eq!(stats.writes_logged(), 0);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_outcomes() {
        let stats = RuntimeStats::new();

        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_commit();
        stats.record_abort(TransactionResult::AbortedByRequest);
        stats.record_abort(TransactionResult::AbortedByCascade);
        stats.record_abort(TransactionResult::AbortedByTransactInOnAbort);
        stats.record_abort(TransactionResult::Committed);

        assert_eq!(stats.transactions_started(), 3);
        assert_eq!(stats.transactions_committed(), 1);
        assert_eq!(stats.transactions_aborted(), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.transact_in_handler, 1);
        assert_eq!(snap.transactions_aborted(), 2);
    }

    #[test]
    fn record_writes() {
        let stats = RuntimeStats::new();
        stats.record_logged_write(8);
        stats.record_logged_write(100);
        stats.record_duplicate_skip();
        stats.record_stack_skip();

        let snap = stats.snapshot();
        assert_eq!(snap.writes_logged, 2);
        assert_eq!(snap.bytes_logged, 108);
        assert_eq!(snap.writes_skipped_duplicate, 1);
        assert_eq!(snap.writes_skipped_stack, 1);
    }

    #[test]
    fn reset_clears_counters() {
        let stats = RuntimeStats::new();
        stats.record_transaction_start();
        stats.record_retry();
        stats.record_closed_nest();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(RuntimeStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_logged_write(1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.writes_logged(), 1000);
        assert_eq!(stats.bytes_logged(), 1000);
    }
}

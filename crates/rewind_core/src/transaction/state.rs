//! Transaction state.

use crate::gate::CommitGate;
use crate::memory::{HitSet, NewMemoryTracker, WriteLog};
use crate::task_array::{Task, TaskArray};
use crate::types::{StackRange, TaskKey, TransactionId};
use std::mem;

/// What recording a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    /// The original bytes were appended to the write log.
    Logged {
        /// Entries appended.
        entries: usize,
    },
    /// The same span was already logged by this transaction.
    Duplicate,
    /// The span lies in memory this transaction allocated.
    NewMemory,
}

/// One speculative execution scope.
///
/// A transaction does not know its parent: the context keeps the stack and
/// hands the parent in where an operation needs it.
#[derive(Debug)]
pub(crate) struct Transaction {
    id: TransactionId,
    is_scoped: bool,
    is_done: bool,
    /// Stack addresses belonging to frames this transaction will outlive.
    stack_range: StackRange,
    write_log: WriteLog,
    hit_set: HitSet,
    new_memory: NewMemoryTracker,
    commit_tasks: TaskArray,
    abort_tasks: TaskArray,
}

impl Transaction {
    /// Creates a new transaction.
    pub(crate) fn new(id: TransactionId, is_scoped: bool, stack_range: StackRange) -> Self {
        Self {
            id,
            is_scoped,
            is_done: false,
            stack_range,
            write_log: WriteLog::new(),
            hit_set: HitSet::new(),
            new_memory: NewMemoryTracker::new(),
            commit_tasks: TaskArray::new(),
            abort_tasks: TaskArray::new(),
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns true if the transaction is bound to one `transact` call.
    pub(crate) fn is_scoped(&self) -> bool {
        self.is_scoped
    }

    pub(crate) fn is_done(&self) -> bool {
        self.is_done
    }

    pub(crate) fn set_done(&mut self) {
        self.is_done = true;
    }

    pub(crate) fn stack_range(&self) -> StackRange {
        self.stack_range
    }

    pub(crate) fn write_log(&self) -> &WriteLog {
        &self.write_log
    }

    /// Returns true if nothing would be undone or run on abort.
    pub(crate) fn is_clean(&self) -> bool {
        self.write_log.is_empty()
            && self.abort_tasks.is_empty()
            && self.commit_tasks.is_empty()
            && self.new_memory.is_empty()
    }

    /// Records the span `[address, address + size)` before it is written.
    ///
    /// The stack check is the caller's job; it depends on closed-nest state
    /// the transaction does not see.
    ///
    /// # Safety
    ///
    /// The span must be valid for reads now and for writes until this
    /// transaction is resolved.
    pub(crate) unsafe fn record_write(&mut self, address: usize, size: usize) -> RecordOutcome {
        if HitSet::tracks(size) && !self.hit_set.insert(address, size) {
            return RecordOutcome::Duplicate;
        }
        if self.new_memory.contains(address, size) {
            return RecordOutcome::NewMemory;
        }
        // SAFETY: forwarded from the caller.
        let entries = unsafe { self.write_log.record(address, size) };
        RecordOutcome::Logged { entries }
    }

    /// Registers memory allocated while this transaction runs.
    pub(crate) fn did_allocate(&mut self, address: usize, size: usize) {
        self.new_memory.insert(address, size);
    }

    /// Checks that memory this transaction allocated is not released early.
    pub(crate) fn did_free(&self, address: usize) {
        assert!(
            !self.new_memory.contains_address(address),
            "{} freed {address:#x} while it still tracks the allocation; defer the release to a commit task",
            self.id
        );
    }

    pub(crate) fn defer_until_commit(&mut self, task: Task) {
        self.commit_tasks.add(task);
    }

    pub(crate) fn defer_until_abort(&mut self, task: Task) {
        self.abort_tasks.add(task);
    }

    pub(crate) fn push_defer_until_abort_handler(&mut self, key: TaskKey, task: Task) {
        self.abort_tasks.add_keyed(key, task);
    }

    pub(crate) fn pop_defer_until_abort_handler(&mut self, key: TaskKey) -> bool {
        self.abort_tasks.delete_key(key)
    }

    pub(crate) fn pop_all_defer_until_abort_handlers(&mut self, key: TaskKey) -> bool {
        self.abort_tasks.delete_all_keys(key)
    }

    /// Merges a committed nested transaction into its parent.
    ///
    /// Write-log entries that fall inside the parent's stack range are
    /// dropped: those frames are gone before the parent could undo them.
    /// Returns the number of entries dropped.
    pub(crate) fn commit_into(&mut self, parent: &mut Transaction) -> usize {
        let parent_stack = parent.stack_range;
        let dropped = mem::take(&mut self.write_log)
            .merge_into(&mut parent.write_log, |entry| !parent_stack.contains(entry.address()));

        parent.commit_tasks.append(mem::take(&mut self.commit_tasks));
        parent.abort_tasks.append(mem::take(&mut self.abort_tasks));
        parent.new_memory.merge(mem::take(&mut self.new_memory));
        self.hit_set.clear();
        dropped
    }

    /// Finalizes the outermost transaction.
    ///
    /// Consults `gate` first; on refusal nothing has run and the caller must
    /// abort. Otherwise the abort tasks are discarded and every commit task
    /// runs in registration order.
    pub(crate) fn commit_outermost(&mut self, gate: &dyn CommitGate) -> bool {
        if !gate.can_finalize() {
            return false;
        }
        self.abort_tasks.clear();
        let commit_tasks = mem::take(&mut self.commit_tasks);
        self.reset();
        commit_tasks.run_forward();
        true
    }

    /// Rolls back every recorded write and runs the abort tasks.
    ///
    /// Memory is restored newest entry first, then commit tasks are dropped,
    /// then abort tasks run newest first. Leaves the transaction empty, so
    /// calling it twice is harmless.
    pub(crate) fn abort_without_throwing(&mut self) {
        for entry in self.write_log.iter().rev() {
            assert!(
                !self.stack_range.contains(entry.address()),
                "{} logged its own stack address {:#x}",
                self.id,
                entry.address()
            );
            // SAFETY: every entry was recorded under the contract of
            // `record_write`, which keeps the span writable until now.
            unsafe { self.write_log.restore(entry) };
        }
        self.commit_tasks.clear();
        let abort_tasks = mem::take(&mut self.abort_tasks);
        self.reset();
        abort_tasks.run_reverse();
    }

    /// Clears every collection so the transaction can run again.
    pub(crate) fn reset(&mut self) {
        self.write_log.reset();
        self.hit_set.clear();
        self.new_memory.clear();
        self.commit_tasks.clear();
        self.abort_tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AlwaysCommit;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn transaction(id: u64) -> Transaction {
        Transaction::new(TransactionId::new(id), true, StackRange::EMPTY)
    }

    fn address_of<T>(value: &mut T) -> usize {
        value as *mut T as usize
    }

    #[test]
    fn duplicate_writes_log_once() {
        let mut value = 5u32;
        let mut txn = transaction(1);
        let address = address_of(&mut value);

        let first = unsafe { txn.record_write(address, 4) };
        let second = unsafe { txn.record_write(address, 4) };
        assert_eq!(first, RecordOutcome::Logged { entries: 1 });
        assert_eq!(second, RecordOutcome::Duplicate);
        assert_eq!(txn.write_log().len(), 1);
    }

    #[test]
    fn large_writes_are_not_deduplicated() {
        let mut buffer = [0u8; 64];
        let mut txn = transaction(1);
        let address = address_of(&mut buffer);

        unsafe {
            txn.record_write(address, 64);
            txn.record_write(address, 64);
        }
        assert_eq!(txn.write_log().len(), 2);
    }

    #[test]
    fn new_memory_is_not_logged() {
        let mut buffer = [0u8; 32];
        let mut txn = transaction(1);
        let address = address_of(&mut buffer);

        txn.did_allocate(address, 32);
        let outcome = unsafe { txn.record_write(address + 8, 8) };
        assert_eq!(outcome, RecordOutcome::NewMemory);
        assert!(txn.write_log().is_empty());
    }

    #[test]
    #[should_panic(expected = "defer the release")]
    fn early_free_panics() {
        let mut txn = transaction(1);
        txn.did_allocate(0x1000, 16);
        txn.did_free(0x1000);
    }

    #[test]
    fn abort_restores_and_runs_tasks_in_reverse() {
        let mut value = 10u64;
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut txn = transaction(1);

        unsafe { txn.record_write(address_of(&mut value), 8) };
        value = 20;
        assert_eq!(value, 20);

        for name in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            txn.defer_until_abort(Box::new(move || order.borrow_mut().push(name)));
        }
        let committed = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&committed);
        txn.defer_until_commit(Box::new(move || *flag.borrow_mut() = true));

        txn.abort_without_throwing();

        assert_eq!(std::hint::black_box(value), 10);
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
        assert!(!*committed.borrow());
        assert!(txn.is_clean());

        // A second abort has nothing left to do.
        txn.abort_without_throwing();
        assert_eq!(order.borrow().len(), 3);
    }

    #[test]
    fn outermost_commit_runs_tasks_in_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut txn = transaction(1);
        for name in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            txn.defer_until_commit(Box::new(move || order.borrow_mut().push(name)));
        }
        let aborted = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&aborted);
        txn.defer_until_abort(Box::new(move || *flag.borrow_mut() = true));

        assert!(txn.commit_outermost(&AlwaysCommit));
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert!(!*aborted.borrow());
        assert!(txn.is_clean());
    }

    #[test]
    fn refused_commit_runs_nothing() {
        let ran = Rc::new(RefCell::new(false));
        let mut txn = transaction(1);
        let flag = Rc::clone(&ran);
        txn.defer_until_commit(Box::new(move || *flag.borrow_mut() = true));

        assert!(!txn.commit_outermost(&|| false));
        assert!(!*ran.borrow());
        assert!(!txn.is_clean());
    }

    #[test]
    fn nested_commit_moves_everything_to_parent() {
        let mut value = 1u32;
        let mut parent = transaction(1);
        let mut child = transaction(2);

        unsafe { child.record_write(address_of(&mut value), 4) };
        value = 2;
        assert_eq!(value, 2);
        child.did_allocate(0x5000, 16);
        child.push_defer_until_abort_handler(TaskKey::new(3), Box::new(|| {}));
        child.defer_until_commit(Box::new(|| {}));

        assert_eq!(child.commit_into(&mut parent), 0);
        assert!(child.is_clean());
        assert_eq!(parent.write_log().len(), 1);
        assert!(parent.pop_defer_until_abort_handler(TaskKey::new(3)));

        parent.abort_without_throwing();
        assert_eq!(std::hint::black_box(value), 1);
    }

    #[test]
    fn nested_commit_drops_parent_stack_entries() {
        let mut inside = 0u64;
        let mut outside = 0u64;
        let inside_address = address_of(&mut inside);

        let mut parent = Transaction::new(
            TransactionId::new(1),
            true,
            StackRange::new(inside_address, inside_address + 8),
        );
        let mut child = transaction(2);
        unsafe {
            child.record_write(inside_address, 8);
            child.record_write(address_of(&mut outside), 8);
        }

        assert_eq!(child.commit_into(&mut parent), 1);
        assert_eq!(parent.write_log().len(), 1);
        assert_eq!(
            parent.write_log().iter().next().map(|e| e.address()),
            Some(address_of(&mut outside))
        );
    }

    #[test]
    fn pop_handlers() {
        let mut txn = transaction(1);
        let key = TaskKey::new(9);
        txn.push_defer_until_abort_handler(key, Box::new(|| {}));
        txn.push_defer_until_abort_handler(key, Box::new(|| {}));
        txn.push_defer_until_abort_handler(key, Box::new(|| {}));

        assert!(txn.pop_defer_until_abort_handler(key));
        assert!(txn.pop_all_defer_until_abort_handlers(key));
        assert!(!txn.pop_defer_until_abort_handler(key));
    }
}

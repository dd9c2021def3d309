//! Free-function access to the calling thread's context.
//!
//! Each thread lazily gets its own [`Context`] with the default
//! configuration. Calls made on one thread never observe a transaction
//! running on another: they reach a different context, which is `Idle`.
//!
//! ```rust
//! use rewind_core::api;
//! use rewind_core::TransactionResult;
//!
//! let mut value = 1;
//! // SAFETY: `value` outlives the transaction.
//! let result = api::transact(|| unsafe { api::write(&mut value, 2) });
//! assert_eq!(result, TransactionResult::Committed);
//! assert_eq!(value, 2);
//! ```

use crate::config::{EnabledState, RetryMode};
use crate::context::Context;
use crate::error::TxResult;
use crate::stats::RuntimeStats;
use crate::types::{ContextStatus, TaskKey, TransactionResult};
use std::convert::Infallible;
use std::sync::Arc;

thread_local! {
    static CONTEXT: Context = Context::default();
}

/// Runs `f` with the calling thread's context.
pub fn with_context<R>(f: impl FnOnce(&Context) -> R) -> R {
    CONTEXT.with(f)
}

/// See [`Context::transact`].
pub fn transact(work: impl FnMut() -> TxResult<()>) -> TransactionResult {
    with_context(|ctx| ctx.transact(work))
}

/// See [`Context::transact_then_open`].
pub fn transact_then_open(work: impl FnMut()) -> TransactionResult {
    with_context(|ctx| ctx.transact_then_open(work))
}

/// See [`Context::commit`].
pub fn commit(work: impl FnMut() -> TxResult<()>) {
    with_context(|ctx| ctx.commit(work));
}

/// Runs `work` as open code. See [`Context::open`].
pub fn open<R>(work: impl FnOnce() -> R) -> TxResult<R> {
    with_context(|ctx| ctx.open(work))
}

/// Runs `work` as closed code from open code. See [`Context::call_closed_nest`].
pub fn close(work: impl FnMut() -> TxResult<()>) -> ContextStatus {
    with_context(|ctx| ctx.call_closed_nest(work))
}

/// See [`Context::start_transaction`].
pub fn start_transaction() -> bool {
    with_context(Context::start_transaction)
}

/// See [`Context::commit_transaction`].
pub fn commit_transaction() -> TransactionResult {
    with_context(Context::commit_transaction)
}

/// Aborts the current transaction, raising the abort from closed code.
pub fn abort_transaction() -> TxResult<TransactionResult> {
    with_context(|ctx| ctx.abort_transaction(ctx.is_closed(), false))
}

/// Aborts the current transaction and every enclosing one.
pub fn cascading_abort_transaction() -> TxResult<TransactionResult> {
    with_context(|ctx| ctx.abort_transaction(ctx.is_closed(), true))
}

/// See [`Context::clear_transaction_status`].
pub fn clear_transaction_status() {
    with_context(Context::clear_transaction_status);
}

/// See [`Context::abort_by_request_and_throw`].
pub fn abort_by_request_and_throw() -> TxResult<Infallible> {
    with_context(Context::abort_by_request_and_throw)
}

/// See [`Context::abort_by_language_and_throw`].
pub fn abort_by_language_and_throw() -> TxResult<Infallible> {
    with_context(Context::abort_by_language_and_throw)
}

/// See [`Context::abort_by_request_without_throwing`].
pub fn abort_by_request_without_throwing() {
    with_context(Context::abort_by_request_without_throwing)
}

/// See [`Context::abort_if_transactional`].
pub fn abort_if_transactional() -> TxResult<()> {
    with_context(Context::abort_if_transactional)
}

/// See [`Context::abort_if_closed`].
pub fn abort_if_closed() -> TxResult<()> {
    with_context(Context::abort_if_closed)
}

/// See [`Context::is_transactional`].
pub fn is_transactional() -> bool {
    with_context(Context::is_transactional)
}

/// See [`Context::is_closed`].
pub fn is_closed() -> bool {
    with_context(Context::is_closed)
}

/// See [`Context::is_committing_or_aborting`].
pub fn is_committing_or_aborting() -> bool {
    with_context(Context::is_committing_or_aborting)
}

/// See [`Context::is_on_current_transaction_stack`].
pub fn is_on_current_transaction_stack(address: *const u8) -> bool {
    with_context(|ctx| ctx.is_on_current_transaction_stack(address))
}

/// See [`Context::write`].
///
/// # Safety
///
/// `target` must stay allocated and in place until the outermost transaction
/// resolves.
pub unsafe fn write<T: Copy>(target: &mut T, value: T) -> TxResult<()> {
    // SAFETY: forwarded from the caller.
    with_context(|ctx| unsafe { ctx.write(target, value) })
}

/// See [`Context::record_write_of`].
///
/// # Safety
///
/// `target` must stay allocated and in place until the outermost transaction
/// resolves.
pub unsafe fn record_write_of<T: ?Sized>(target: &T) -> TxResult<()> {
    // SAFETY: forwarded from the caller.
    with_context(|ctx| unsafe { ctx.record_write_of(target) })
}

/// See [`Context::record_write`].
///
/// # Safety
///
/// Same contract as [`Context::record_write`].
pub unsafe fn record_write(address: *const u8, size: usize) -> TxResult<()> {
    // SAFETY: forwarded from the caller.
    with_context(|ctx| unsafe { ctx.record_write(address, size) })
}

/// See [`Context::did_allocate`].
pub fn did_allocate(address: *const u8, size: usize) {
    with_context(|ctx| ctx.did_allocate(address, size));
}

/// See [`Context::did_free`].
pub fn did_free(address: *const u8) {
    with_context(|ctx| ctx.did_free(address));
}

/// See [`Context::on_commit`].
pub fn on_commit(task: impl FnOnce() + 'static) {
    with_context(|ctx| ctx.on_commit(task));
}

/// See [`Context::on_abort`].
pub fn on_abort(task: impl FnOnce() + 'static) {
    with_context(|ctx| ctx.on_abort(task));
}

/// See [`Context::push_on_abort_handler`].
pub fn push_on_abort_handler(key: TaskKey, task: impl FnOnce() + 'static) {
    with_context(|ctx| ctx.push_on_abort_handler(key, task));
}

/// See [`Context::pop_on_abort_handler`].
pub fn pop_on_abort_handler(key: TaskKey) -> bool {
    with_context(|ctx| ctx.pop_on_abort_handler(key))
}

/// See [`Context::pop_all_on_abort_handlers`].
pub fn pop_all_on_abort_handlers(key: TaskKey) -> bool {
    with_context(|ctx| ctx.pop_all_on_abort_handlers(key))
}

/// See [`Context::set_enabled_state`].
pub fn set_enabled_state(state: EnabledState) -> bool {
    with_context(|ctx| ctx.set_enabled_state(state))
}

/// See [`Context::set_retry_mode`].
pub fn set_retry_mode(mode: RetryMode) {
    with_context(|ctx| ctx.set_retry_mode(mode));
}

/// Returns the calling thread's statistics.
pub fn stats() -> Arc<RuntimeStats> {
    with_context(Context::stats)
}

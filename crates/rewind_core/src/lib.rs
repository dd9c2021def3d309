//! # Rewind Core
//!
//! Undo-logging software transactional memory for a single thread.
//!
//! Code running inside a transaction reports every write before it happens.
//! The runtime saves the original bytes, so an abort can put memory back
//! exactly as it was and a commit can simply forget them.
//!
//! This crate provides:
//! - [`Context`] - the per-thread transaction state machine
//! - Nested, non-scoped and retried transactions
//! - Commit tasks, abort tasks and cancellable abort handlers
//! - Open and closed regions with stack-aware write filtering
//! - [`api`] - free functions over a thread-local context
//!
//! ## Example
//!
//! ```rust
//! use rewind_core::{Context, RuntimeConfig, TransactionResult};
//!
//! let ctx = Context::new(RuntimeConfig::default());
//! let mut outer = 0u32;
//!
//! let result = ctx.transact(|| {
//!     // SAFETY: `outer` outlives every transaction below.
//!     unsafe { ctx.write(&mut outer, 1)? };
//!     let inner = ctx.transact(|| unsafe { ctx.write(&mut outer, 2) });
//!     assert_eq!(inner, TransactionResult::Committed);
//!     ctx.abort_by_request_and_throw()?;
//!     Ok(())
//! });
//!
//! assert_eq!(result, TransactionResult::AbortedByRequest);
//! assert_eq!(outer, 0);
//! ```
//!
//! ## Aborts
//!
//! An abort restores memory and runs abort tasks at the point it is raised,
//! then returns [`Aborted`] so the caller can leave with `?`. Transaction
//! boundaries catch it and report a [`TransactionResult`].

#![warn(missing_docs)]

pub mod api;
mod config;
mod context;
mod error;
mod gate;
pub mod memory;
mod stack;
mod stats;
pub mod task_array;
mod transaction;
mod types;

pub use config::{EnabledState, RetryMode, RuntimeConfig};
pub use context::Context;
pub use error::{Aborted, ConfigError, ConfigResult, TxResult};
pub use gate::{AlwaysCommit, CommitGate};
pub use stack::{frame_address, FixedStackBounds, PlatformStackBounds, StackBounds};
pub use stats::{RuntimeStats, StatsSnapshot};
pub use task_array::{Task, TaskArray};
pub use types::{ContextStatus, StackRange, TaskKey, TransactionId, TransactionResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Error types for the runtime.
//!
//! Two kinds of failure exist. A transactional abort is an expected outcome
//! and travels as [`Aborted`] through `?` until the nearest transaction
//! boundary catches it. Misuse of the API (wrong status, unmatched handler
//! pops, overlapping allocations) is a broken contract and panics.

use crate::types::ContextStatus;
use thiserror::Error;

/// Result type for code running inside a transaction.
///
/// An `Err` means the enclosing transaction has been aborted and rolled back;
/// the caller must return it so the transaction boundary can resolve it.
pub type TxResult<T = ()> = Result<T, Aborted>;

/// Signal that the current transaction was aborted.
///
/// By the time this value exists the transaction's writes have already been
/// restored and its abort tasks have run. It cannot be constructed outside
/// the runtime, so a boundary only ever sees aborts the runtime performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transaction aborted: {status}")]
pub struct Aborted {
    status: ContextStatus,
}

impl Aborted {
    pub(crate) fn new(status: ContextStatus) -> Self {
        debug_assert!(status.is_aborting(), "abort signal with status {status}");
        Self { status }
    }

    /// Returns the aborted status that raised this signal.
    #[must_use]
    pub const fn status(&self) -> ContextStatus {
        self.status
    }
}

/// Result type for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Unknown enablement state name.
    #[error("unknown enabled state: {name}")]
    UnknownEnabledState {
        /// The name that failed to parse.
        name: String,
    },

    /// Unknown retry mode name.
    #[error("unknown retry mode: {name}")]
    UnknownRetryMode {
        /// The name that failed to parse.
        name: String,
    },
}

impl ConfigError {
    /// Creates an unknown enabled state error.
    pub fn unknown_enabled_state(name: impl Into<String>) -> Self {
        Self::UnknownEnabledState { name: name.into() }
    }

    /// Creates an unknown retry mode error.
    pub fn unknown_retry_mode(name: impl Into<String>) -> Self {
        Self::UnknownRetryMode { name: name.into() }
    }
}

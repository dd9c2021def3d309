//! Runtime configuration.

use crate::error::{ConfigError, ConfigResult};
use std::fmt;
use std::str::FromStr;

/// Whether the runtime records anything at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnabledState {
    /// Transactions run speculatively.
    #[default]
    Enabled,
    /// Transactions run their work directly and always commit.
    Disabled,
    /// Enabled, and further changes are refused.
    ForcedEnabled,
    /// Disabled, and further changes are refused.
    ForcedDisabled,
}

impl EnabledState {
    /// Returns true if transactions run speculatively.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::ForcedEnabled)
    }

    /// Returns true if the state refuses run-time changes.
    #[must_use]
    pub const fn is_forced(self) -> bool {
        matches!(self, Self::ForcedEnabled | Self::ForcedDisabled)
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::ForcedEnabled => "forced-enabled",
            Self::ForcedDisabled => "forced-disabled",
        }
    }
}

impl fmt::Display for EnabledState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnabledState {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" | "on" => Ok(Self::Enabled),
            "disabled" | "off" => Ok(Self::Disabled),
            "forced-enabled" => Ok(Self::ForcedEnabled),
            "forced-disabled" => Ok(Self::ForcedDisabled),
            _ => Err(ConfigError::unknown_enabled_state(s)),
        }
    }
}

/// Test toggle that forces transactions through an abort and a retry.
///
/// A transaction selected by the mode is rolled back once at the point it
/// would have committed and then run again. This exercises the abort paths
/// of code that normally always commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    /// Never force a retry.
    #[default]
    NoRetry,
    /// Retry outermost transactions once.
    RetryNonNested,
    /// Retry every transaction once, nested ones included.
    RetryNestedToo,
}

impl RetryMode {
    /// Returns true if a transaction at the given nesting should be retried
    /// on its first attempt.
    #[must_use]
    pub const fn should_retry(self, is_nested: bool) -> bool {
        match self {
            Self::NoRetry => false,
            Self::RetryNonNested => !is_nested,
            Self::RetryNestedToo => true,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoRetry => "no-retry",
            Self::RetryNonNested => "non-nested",
            Self::RetryNestedToo => "nested-too",
        }
    }
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "no-retry" | "none" | "0" => Ok(Self::NoRetry),
            "non-nested" | "1" => Ok(Self::RetryNonNested),
            "nested-too" | "2" => Ok(Self::RetryNestedToo),
            _ => Err(ConfigError::unknown_retry_mode(s)),
        }
    }
}

/// Configuration for a [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Whether transactions run speculatively.
    pub enabled: EnabledState,

    /// Forced abort-and-retry toggle.
    pub retry: RetryMode,

    /// Stack size assumed below the outermost transaction when the platform
    /// cannot report the thread's stack bounds.
    pub stack_size_hint: usize,

    /// Emit a warning whenever a transaction aborts by language.
    pub ensure_on_abort_by_language: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: EnabledState::Enabled,
            retry: RetryMode::NoRetry,
            stack_size_hint: 8 * 1024 * 1024, // 8 MB
            ensure_on_abort_by_language: true,
        }
    }
}

impl RuntimeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the enablement state.
    #[must_use]
    pub const fn enabled(mut self, state: EnabledState) -> Self {
        self.enabled = state;
        self
    }

    /// Sets the forced retry mode.
    #[must_use]
    pub const fn retry(mut self, mode: RetryMode) -> Self {
        self.retry = mode;
        self
    }

    /// Sets the fallback stack size.
    #[must_use]
    pub const fn stack_size_hint(mut self, bytes: usize) -> Self {
        self.stack_size_hint = bytes;
        self
    }

    /// Sets whether aborts by language emit a warning.
    #[must_use]
    pub const fn ensure_on_abort_by_language(mut self, value: bool) -> Self {
        self.ensure_on_abort_by_language = value;
        self
    }
}

//! Core type definitions for the runtime.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing per context and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Status of a [`Context`](crate::Context).
///
/// Governs which operations are legal; most operations assert the expected
/// status on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextStatus {
    /// No transaction is running.
    #[default]
    Idle,
    /// Transactional code is running normally.
    OnTrack,
    /// The outermost transaction is running its commit tasks.
    Committing,
    /// An explicit abort was requested.
    AbortedByRequest,
    /// The runtime hit code it cannot run transactionally.
    AbortedByLanguage,
    /// A nested transaction forced every ancestor to abort.
    AbortedByCascade,
    /// The commit gate refused to finalize; only visible inside the retry loop.
    AbortedByFailedLockAcquisition,
}

impl ContextStatus {
    /// Returns true for any of the aborted-by-* states.
    #[must_use]
    pub const fn is_aborting(self) -> bool {
        matches!(
            self,
            Self::AbortedByRequest
                | Self::AbortedByLanguage
                | Self::AbortedByCascade
                | Self::AbortedByFailedLockAcquisition
        )
    }

    /// Returns the transaction result an aborted status resolves to.
    ///
    /// Returns `None` for non-aborting states and for a failed lock
    /// acquisition, which is always retried.
    #[must_use]
    pub const fn abort_result(self) -> Option<TransactionResult> {
        match self {
            Self::AbortedByRequest => Some(TransactionResult::AbortedByRequest),
            Self::AbortedByLanguage => Some(TransactionResult::AbortedByLanguage),
            Self::AbortedByCascade => Some(TransactionResult::AbortedByCascade),
            _ => None,
        }
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OnTrack => "on-track",
            Self::Committing => "committing",
            Self::AbortedByRequest => "aborted-by-request",
            Self::AbortedByLanguage => "aborted-by-language",
            Self::AbortedByCascade => "aborted-by-cascade",
            Self::AbortedByFailedLockAcquisition => "aborted-by-failed-lock-acquisition",
        }
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum TransactionResult {
    /// The transaction committed.
    Committed,
    /// The transaction was aborted explicitly.
    AbortedByRequest,
    /// The transaction ran into code that cannot run transactionally.
    AbortedByLanguage,
    /// The transaction was aborted by a cascading abort.
    AbortedByCascade,
    /// A transaction was started from a commit task; its work never ran.
    AbortedByTransactInOnCommit,
    /// A transaction was started from an abort task; its work never ran.
    AbortedByTransactInOnAbort,
}

impl TransactionResult {
    /// Returns true if the transaction committed.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::AbortedByRequest => "aborted-by-request",
            Self::AbortedByLanguage => "aborted-by-language",
            Self::AbortedByCascade => "aborted-by-cascade",
            Self::AbortedByTransactInOnCommit => "aborted-by-transact-in-on-commit",
            Self::AbortedByTransactInOnAbort => "aborted-by-transact-in-on-abort",
        }
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open range `[low, high)` of native stack addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackRange {
    /// Lowest address in the range.
    pub low: usize,
    /// One past the highest address in the range.
    pub high: usize,
}

impl StackRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    /// An empty range that contains no address.
    pub const EMPTY: Self = Self { low: 0, high: 0 };

    /// Returns true if `address` lies inside the range.
    #[must_use]
    pub const fn contains(&self, address: usize) -> bool {
        self.low <= address && address < self.high
    }

    /// Returns true if the range holds no address.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.low >= self.high
    }

    /// Returns the number of bytes covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.high.saturating_sub(self.low)
    }
}

impl fmt::Display for StackRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.low, self.high)
    }
}

/// Cancellation key for keyed abort handlers.
///
/// Keys are compared by value. They are usually derived from the address of
/// the object a handler guards, see [`TaskKey::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey(pub usize);

impl TaskKey {
    /// Creates a key from a raw value.
    #[must_use]
    pub const fn new(key: usize) -> Self {
        Self(key)
    }

    /// Creates a key from the address of `value`.
    #[must_use]
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self((value as *const T).cast::<u8>() as usize)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for TaskKey {
    fn from(key: usize) -> Self {
        Self(key)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{:#x}", self.0)
    }
}

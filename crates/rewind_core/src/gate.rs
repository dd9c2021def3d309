//! Commit finalization gate.

/// Decides whether the outermost transaction may finalize its commit.
///
/// The gate is consulted once per commit attempt, before any commit task
/// runs. A refusal rolls the transaction back and runs it again, which is how
/// a lock that could not be acquired surfaces to transactional code.
pub trait CommitGate {
    /// Returns true if the commit may proceed.
    fn can_finalize(&self) -> bool;
}

impl<F> CommitGate for F
where
    F: Fn() -> bool,
{
    fn can_finalize(&self) -> bool {
        self()
    }
}

/// Gate that admits every commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCommit;

impl CommitGate for AlwaysCommit {
    fn can_finalize(&self) -> bool {
        true
    }
}

//! Call nests: the boundaries aborts unwind to.

use crate::error::TxResult;
use crate::types::{ContextStatus, TransactionId};

/// What a call nest guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NestKind {
    /// The body of a scoped transaction.
    Transaction(TransactionId),
    /// Closed code entered from open code.
    Closed,
}

/// One frame that catches an abort signal.
///
/// An [`Aborted`](crate::Aborted) returned from the work travels back through
/// every intervening `?` and stops here, never earlier.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallNest {
    kind: NestKind,
    /// Stack marker of the frame that entered the nest.
    stack_address: usize,
}

impl CallNest {
    pub(crate) fn transaction(id: TransactionId, stack_address: usize) -> Self {
        Self {
            kind: NestKind::Transaction(id),
            stack_address,
        }
    }

    pub(crate) fn closed(stack_address: usize) -> Self {
        Self {
            kind: NestKind::Closed,
            stack_address,
        }
    }

    pub(crate) fn kind(&self) -> NestKind {
        self.kind
    }

    pub(crate) fn stack_address(&self) -> usize {
        self.stack_address
    }

    /// Runs `work`, catching exactly one abort signal.
    ///
    /// A caught signal must leave the context aborting. A normal return must
    /// leave it on track or aborting, the latter when the work aborted
    /// without throwing.
    pub(crate) fn try_run(
        &self,
        work: &mut dyn FnMut() -> TxResult<()>,
        status: impl Fn() -> ContextStatus,
    ) {
        match work() {
            Ok(()) => {
                let status = status();
                assert!(
                    status == ContextStatus::OnTrack || status.is_aborting(),
                    "{:?} nest returned with status {status}",
                    self.kind
                );
            }
            Err(aborted) => {
                let status = status();
                assert!(
                    status.is_aborting(),
                    "{:?} nest caught {aborted} while status is {status}",
                    self.kind
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Aborted;
    use std::cell::Cell;

    #[test]
    fn normal_return_on_track() {
        let nest = CallNest::closed(0x1000);
        let ran = Cell::new(false);
        nest.try_run(
            &mut || {
                ran.set(true);
                Ok(())
            },
            || ContextStatus::OnTrack,
        );
        assert!(ran.get());
        assert_eq!(nest.kind(), NestKind::Closed);
        assert_eq!(nest.stack_address(), 0x1000);
    }

    #[test]
    fn caught_abort_while_aborting() {
        let nest = CallNest::transaction(TransactionId::new(1), 0x1000);
        nest.try_run(
            &mut || Err(Aborted::new(ContextStatus::AbortedByRequest)),
            || ContextStatus::AbortedByRequest,
        );
    }

    #[test]
    #[should_panic(expected = "while status is on-track")]
    fn caught_abort_while_on_track_panics() {
        let nest = CallNest::transaction(TransactionId::new(1), 0x1000);
        nest.try_run(
            &mut || Err(Aborted::new(ContextStatus::AbortedByRequest)),
            || ContextStatus::OnTrack,
        );
    }

    #[test]
    #[should_panic(expected = "returned with status committing")]
    fn normal_return_while_committing_panics() {
        let nest = CallNest::closed(0x1000);
        nest.try_run(&mut || Ok(()), || ContextStatus::Committing);
    }
}

//! Transaction plans and their reference model.
//!
//! A [`TxPlan`] describes a tree of nested transactions over a
//! [`SlotBuffer`]. Running it through a context and applying it to a plain
//! `Vec<u64>` model must leave both in the same state.

use crate::fixtures::SlotBuffer;
use rewind_core::{Context, TransactionResult, TxResult};

/// A single write of `value` into `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOp {
    /// Index of the slot.
    pub slot: usize,
    /// Value to store.
    pub value: u64,
}

/// One step of a transaction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write a slot.
    Write(WriteOp),
    /// Run a nested transaction.
    Nested(TxPlan),
}

/// How a planned transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Return normally and commit.
    Commit,
    /// Abort by request.
    Abort,
    /// Abort this transaction and every enclosing one.
    Cascade,
}

/// A transaction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPlan {
    /// Steps run in order.
    pub steps: Vec<Step>,
    /// What happens after the last step.
    pub ending: Ending,
}

impl TxPlan {
    /// Creates a plan that commits after `steps`.
    pub fn commit(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ending: Ending::Commit,
        }
    }

    /// Creates a plan that aborts after `steps`.
    pub fn abort(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ending: Ending::Abort,
        }
    }

    /// Returns the number of writes in the whole tree.
    pub fn write_count(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Write(_) => 1,
                Step::Nested(child) => child.write_count(),
            })
            .sum()
    }

    /// Returns the nesting depth, counting this transaction.
    pub fn depth(&self) -> usize {
        1 + self
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::Nested(child) => Some(child.depth()),
                Step::Write(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Returns the largest slot index written, if any.
    pub fn max_slot(&self) -> Option<usize> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Write(op) => Some(op.slot),
                Step::Nested(child) => child.max_slot(),
            })
            .max()
    }
}

/// Runs `plan` as a transaction on `ctx`.
pub fn run_plan(ctx: &Context, buffer: &SlotBuffer, plan: &TxPlan) -> TransactionResult {
    ctx.transact(|| run_body(ctx, buffer, plan))
}

fn run_body(ctx: &Context, buffer: &SlotBuffer, plan: &TxPlan) -> TxResult<()> {
    for step in &plan.steps {
        match step {
            Step::Write(op) => buffer.write(ctx, op.slot, op.value)?,
            Step::Nested(child) => {
                // A cascade leaves this transaction aborting and rolled back.
                let result = run_plan(ctx, buffer, child);
                debug_assert_eq!(
                    result == TransactionResult::AbortedByCascade,
                    ctx.is_aborting(),
                    "nested {result} with parent status {}",
                    ctx.status()
                );
                if ctx.is_aborting() {
                    return Ok(());
                }
            }
        }
    }
    match plan.ending {
        Ending::Commit => Ok(()),
        Ending::Abort => {
            ctx.abort_by_request_and_throw()?;
            Ok(())
        }
        Ending::Cascade => ctx.abort_transaction(ctx.is_closed(), true).map(|_| ()),
    }
}

/// Applies `plan` to `model`, returning the result the runtime must report.
pub fn apply_to_model(model: &mut Vec<u64>, plan: &TxPlan) -> TransactionResult {
    let before = model.clone();
    let mut result = match plan.ending {
        Ending::Commit => TransactionResult::Committed,
        Ending::Abort => TransactionResult::AbortedByRequest,
        Ending::Cascade => TransactionResult::AbortedByCascade,
    };
    for step in &plan.steps {
        match step {
            Step::Write(op) => model[op.slot] = op.value,
            Step::Nested(child) => {
                if apply_to_model(model, child) == TransactionResult::AbortedByCascade {
                    result = TransactionResult::AbortedByCascade;
                    break;
                }
            }
        }
    }
    if result != TransactionResult::Committed {
        *model = before;
    }
    result
}

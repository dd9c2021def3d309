//! Reusable end-to-end scenarios.
//!
//! Each scenario runs against a caller-provided context and reports what it
//! expected and what it observed. The CLI prints these reports; tests assert
//! on `passed`.

use rewind_core::{Context, ContextStatus, TransactionResult, TxResult};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;

/// A built-in scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Write then abort by request.
    AbortRestores,
    /// Write then commit.
    CommitKeeps,
    /// Nested commit followed by an outer abort.
    NestedCommitOuterAbort,
    /// Nested abort inside a committing parent.
    NestedAbort,
    /// Cascading abort from a nested transaction.
    Cascade,
}

impl Scenario {
    /// Every scenario, in run order.
    pub const ALL: [Scenario; 5] = [
        Scenario::AbortRestores,
        Scenario::CommitKeeps,
        Scenario::NestedCommitOuterAbort,
        Scenario::NestedAbort,
        Scenario::Cascade,
    ];

    /// Returns the short name used on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Scenario::AbortRestores => "a",
            Scenario::CommitKeeps => "b",
            Scenario::NestedCommitOuterAbort => "c",
            Scenario::NestedAbort => "nested-abort",
            Scenario::Cascade => "cascade",
        }
    }

    /// Returns a one-line description.
    pub const fn description(self) -> &'static str {
        match self {
            Scenario::AbortRestores => "write 42 then abort; the value is restored",
            Scenario::CommitKeeps => "write 42 then commit; the value is kept",
            Scenario::NestedCommitOuterAbort => {
                "nested commit writes 1, outer writes 2 and aborts; the original value is restored"
            }
            Scenario::NestedAbort => {
                "nested abort restores its own writes; the parent commits its own"
            }
            Scenario::Cascade => "cascading abort in a child aborts every ancestor",
        }
    }

    /// Looks a scenario up by its short name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scenario| scenario.name() == name)
    }

    /// Runs the scenario on `ctx`.
    ///
    /// # Panics
    ///
    /// Panics if `ctx` is running a transaction: the scenarios write to
    /// their own locals, which must outlive every transaction that logs them.
    pub fn run(self, ctx: &Context) -> ScenarioReport {
        assert_eq!(
            ctx.status(),
            ContextStatus::Idle,
            "scenario {self} started inside a transaction"
        );
        match self {
            Scenario::AbortRestores => abort_restores(ctx),
            Scenario::CommitKeeps => commit_keeps(ctx),
            Scenario::NestedCommitOuterAbort => nested_commit_outer_abort(ctx),
            Scenario::NestedAbort => nested_abort(ctx),
            Scenario::Cascade => cascade(ctx),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Short name.
    pub name: &'static str,
    /// What the scenario checks.
    pub description: &'static str,
    /// Result the transaction should report.
    pub expected_result: String,
    /// Result the transaction reported.
    pub actual_result: String,
    /// Value the tracked memory should hold afterwards.
    pub expected_value: i64,
    /// Value the tracked memory holds afterwards.
    pub actual_value: i64,
    /// True if the context ended idle.
    pub idle_after: bool,
    /// True if everything matched.
    pub passed: bool,
}

impl ScenarioReport {
    fn new(
        scenario: Scenario,
        ctx: &Context,
        expected: (TransactionResult, i64),
        actual: (TransactionResult, i64),
    ) -> Self {
        let idle_after = ctx.status() == ContextStatus::Idle;
        Self {
            name: scenario.name(),
            description: scenario.description(),
            expected_result: expected.0.to_string(),
            actual_result: actual.0.to_string(),
            expected_value: expected.1,
            actual_value: actual.1,
            idle_after,
            passed: expected == actual && idle_after,
        }
    }
}

fn set(ctx: &Context, cell: &Cell<i64>, value: i64) -> TxResult<()> {
    // SAFETY: scenario cells are locals of `Scenario::run`'s callee, which
    // starts idle, so they outlive every transaction that logs them.
    unsafe { ctx.record_write_of(cell)? };
    cell.set(value);
    Ok(())
}

fn abort_restores(ctx: &Context) -> ScenarioReport {
    let mut value = 7i64;
    let result = ctx.transact(|| {
        // SAFETY: `value` outlives the transaction.
        unsafe { ctx.write(&mut value, 42)? };
        ctx.abort_by_request_and_throw()?;
        Ok(())
    });
    ScenarioReport::new(
        Scenario::AbortRestores,
        ctx,
        (TransactionResult::AbortedByRequest, 7),
        (result, value),
    )
}

fn commit_keeps(ctx: &Context) -> ScenarioReport {
    let mut value = 7i64;
    // SAFETY: `value` outlives the transaction.
    let result = ctx.transact(|| unsafe { ctx.write(&mut value, 42) });
    ScenarioReport::new(
        Scenario::CommitKeeps,
        ctx,
        (TransactionResult::Committed, 42),
        (result, value),
    )
}

fn nested_commit_outer_abort(ctx: &Context) -> ScenarioReport {
    let field = Cell::new(7i64);
    let result = ctx.transact(|| {
        let inner = ctx.transact(|| set(ctx, &field, 1));
        if inner.is_committed() {
            set(ctx, &field, 2)?;
        }
        ctx.abort_by_request_and_throw()?;
        Ok(())
    });
    ScenarioReport::new(
        Scenario::NestedCommitOuterAbort,
        ctx,
        (TransactionResult::AbortedByRequest, 7),
        (result, field.get()),
    )
}

fn nested_abort(ctx: &Context) -> ScenarioReport {
    let outer = Cell::new(0i64);
    let inner = Cell::new(0i64);
    let result = ctx.transact(|| {
        set(ctx, &outer, 5)?;
        let _ = ctx.transact(|| {
            set(ctx, &outer, 6)?;
            set(ctx, &inner, 9)?;
            ctx.abort_by_request_and_throw()?;
            Ok(())
        });
        Ok(())
    });
    // Encode both cells so one value checks the whole outcome.
    ScenarioReport::new(
        Scenario::NestedAbort,
        ctx,
        (TransactionResult::Committed, 50),
        (result, outer.get() * 10 + inner.get()),
    )
}

fn cascade(ctx: &Context) -> ScenarioReport {
    let value = Cell::new(3i64);
    let result = ctx.transact(|| {
        set(ctx, &value, 4)?;
        let _ = ctx.transact(|| {
            let _ = ctx.transact(|| {
                set(ctx, &value, 5)?;
                ctx.abort_transaction(ctx.is_closed(), true)?;
                Ok(())
            });
            set(ctx, &value, 6)
        });
        set(ctx, &value, 7)
    });
    ScenarioReport::new(
        Scenario::Cascade,
        ctx,
        (TransactionResult::AbortedByCascade, 3),
        (result, value.get()),
    )
}

/// Runs every scenario on a fresh context each.
pub fn run_all() -> Vec<ScenarioReport> {
    Scenario::ALL
        .into_iter()
        .map(|scenario| scenario.run(&Context::default()))
        .collect()
}

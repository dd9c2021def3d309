//! Property-based test generators using proptest.
//!
//! Provides strategies for write sequences and nested transaction plans
//! over a fixed number of slots.

use crate::plan::{Ending, Step, TxPlan, WriteOp};
use proptest::prelude::*;
use rewind_core::RetryMode;

/// Strategy for a write into one of `slots` slots.
pub fn write_op_strategy(slots: usize) -> impl Strategy<Value = WriteOp> {
    (0..slots, any::<u64>()).prop_map(|(slot, value)| WriteOp { slot, value })
}

/// Strategy for a flat sequence of writes.
pub fn write_ops_strategy(slots: usize, max_len: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(slots), 0..=max_len)
}

/// Strategy for how a transaction ends, weighted towards commits.
pub fn ending_strategy(allow_cascade: bool) -> BoxedStrategy<Ending> {
    if allow_cascade {
        prop_oneof![
            6 => Just(Ending::Commit),
            3 => Just(Ending::Abort),
            1 => Just(Ending::Cascade),
        ]
        .boxed()
    } else {
        prop_oneof![
            2 => Just(Ending::Commit),
            1 => Just(Ending::Abort),
        ]
        .boxed()
    }
}

/// Strategy for a tree of nested transactions up to `depth` levels deep.
pub fn tx_plan_strategy(slots: usize, depth: u32, allow_cascade: bool) -> BoxedStrategy<TxPlan> {
    let leaf = (write_ops_strategy(slots, 6), ending_strategy(allow_cascade)).prop_map(
        |(writes, ending)| TxPlan {
            steps: writes.into_iter().map(Step::Write).collect(),
            ending,
        },
    );

    leaf.prop_recursive(depth, 64, 4, move |inner| {
        (
            prop::collection::vec(
                prop_oneof![
                    3 => write_op_strategy(slots).prop_map(Step::Write),
                    1 => inner.prop_map(Step::Nested),
                ],
                0..6,
            ),
            ending_strategy(allow_cascade),
        )
            .prop_map(|(steps, ending)| TxPlan { steps, ending })
    })
    .boxed()
}

/// Strategy for the retry toggle.
pub fn retry_mode_strategy() -> impl Strategy<Value = RetryMode> {
    prop_oneof![
        Just(RetryMode::NoRetry),
        Just(RetryMode::RetryNonNested),
        Just(RetryMode::RetryNestedToo),
    ]
}

/// Strategy for a span size the hit set tracks.
pub fn small_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=16
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

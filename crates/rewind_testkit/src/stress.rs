//! Stress workloads.
//!
//! Runs many randomized nested transactions against a slot buffer and checks
//! every outcome against the reference model.

use crate::fixtures::SlotBuffer;
use crate::plan::{apply_to_model, run_plan, Ending, Step, TxPlan, WriteOp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rewind_core::{Context, RetryMode, RuntimeConfig, StatsSnapshot, TransactionResult};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of top-level transactions.
    pub transactions: usize,
    /// Writes per transaction body.
    pub writes: usize,
    /// Number of slots in the buffer.
    pub slots: usize,
    /// Every n-th top-level transaction aborts; 0 never aborts.
    pub abort_every: usize,
    /// Maximum nesting depth, counting the top level.
    pub depth: usize,
    /// Forced retry mode.
    pub retry: RetryMode,
    /// Seed for the workload generator.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 10_000,
            writes: 16,
            slots: 256,
            abort_every: 4,
            depth: 3,
            retry: RetryMode::NoRetry,
            seed: 0x5EED,
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Top-level transactions run.
    pub transactions: usize,
    /// Top-level transactions that committed.
    pub committed: usize,
    /// Top-level transactions that aborted.
    pub aborted: usize,
    /// Writes issued, nested ones included.
    pub writes: usize,
    /// Transactions whose outcome or memory disagreed with the model.
    pub mismatches: usize,
    /// Total duration.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Top-level transactions per second.
    pub transactions_per_second: f64,
    /// Runtime counters at the end of the run.
    #[serde(skip)]
    pub stats: StatsSnapshot,
}

impl StressTestResult {
    /// Returns true if every transaction matched the model.
    pub fn verified(&self) -> bool {
        self.mismatches == 0
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Transactions: {}", self.transactions);
        println!("Committed: {}", self.committed);
        println!("Aborted: {}", self.aborted);
        println!("Writes: {}", self.writes);
        println!("Writes logged: {}", self.stats.writes_logged);
        println!("Retries: {}", self.stats.retries);
        println!("Mismatches: {}", self.mismatches);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.transactions_per_second);
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }
}

/// Generates the plan of one top-level transaction.
pub fn random_plan(rng: &mut StdRng, config: &StressConfig, index: usize) -> TxPlan {
    let abort = config.abort_every > 0 && index % config.abort_every == config.abort_every - 1;
    let mut plan = random_body(rng, config, 1);
    plan.ending = if abort { Ending::Abort } else { Ending::Commit };
    plan
}

fn random_body(rng: &mut StdRng, config: &StressConfig, level: usize) -> TxPlan {
    let slots = config.slots.max(1);
    let mut steps = Vec::with_capacity(config.writes + 1);
    for _ in 0..config.writes {
        if level < config.depth && rng.gen_ratio(1, 8) {
            steps.push(Step::Nested(random_body(rng, config, level + 1)));
        }
        steps.push(Step::Write(WriteOp {
            slot: rng.gen_range(0..slots),
            value: rng.gen(),
        }));
    }
    let ending = match rng.gen_range(0..32) {
        0 => Ending::Cascade,
        1..=8 => Ending::Abort,
        _ => Ending::Commit,
    };
    TxPlan { steps, ending }
}

/// Runs a stress workload on a fresh context.
pub fn run_stress(config: &StressConfig) -> StressTestResult {
    let ctx = Context::new(RuntimeConfig::new().retry(config.retry));
    let buffer = SlotBuffer::new(config.slots.max(1));
    let mut model = buffer.snapshot();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut committed = 0usize;
    let mut aborted = 0usize;
    let mut writes = 0usize;
    let mut mismatches = 0usize;

    let start = Instant::now();
    for index in 0..config.transactions {
        let plan = random_plan(&mut rng, config, index);
        writes += plan.write_count();

        let expected = apply_to_model(&mut model, &plan);
        let actual = run_plan(&ctx, &buffer, &plan);
        if actual == TransactionResult::Committed {
            committed += 1;
        } else {
            aborted += 1;
        }
        if actual != expected || buffer.snapshot() != model {
            mismatches += 1;
            model = buffer.snapshot();
        }
    }
    let duration = start.elapsed();

    let transactions_per_second = if duration.as_secs_f64() > 0.0 {
        config.transactions as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    StressTestResult {
        transactions: config.transactions,
        committed,
        aborted,
        writes,
        mismatches,
        duration,
        transactions_per_second,
        stats: ctx.stats().snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            transactions: 200,
            writes: 8,
            slots: 16,
            ..StressConfig::default()
        }
    }

    #[test]
    fn stress_matches_model() {
        let result = run_stress(&small());
        assert!(result.verified(), "{result:?}");
        assert_eq!(result.committed + result.aborted, 200);
        assert!(result.aborted >= 50);
    }

    #[test]
    fn stress_with_retries_matches_model() {
        for retry in [RetryMode::RetryNonNested, RetryMode::RetryNestedToo] {
            let result = run_stress(&StressConfig { retry, ..small() });
            assert!(result.verified(), "{retry}: {result:?}");
            assert!(result.stats.retries > 0);
        }
    }

    #[test]
    fn same_seed_same_plans() {
        let config = small();
        let mut a = StdRng::seed_from_u64(config.seed);
        let mut b = StdRng::seed_from_u64(config.seed);
        for index in 0..10 {
            assert_eq!(
                random_plan(&mut a, &config, index),
                random_plan(&mut b, &config, index)
            );
        }
    }

    #[test]
    fn depth_one_never_nests() {
        let config = StressConfig {
            depth: 1,
            ..small()
        };
        let mut rng = StdRng::seed_from_u64(1);
        for index in 0..20 {
            assert_eq!(random_plan(&mut rng, &config, index).depth(), 1);
        }
    }
}

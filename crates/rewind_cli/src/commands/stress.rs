//! Stress command implementation.

use rewind_testkit::{run_stress, StressConfig, StressTestResult};
use serde::Serialize;
use tracing::info;

/// Stress output: the run result plus the runtime counters.
#[derive(Debug, Serialize)]
pub struct StressOutput {
    /// Retry mode used.
    pub retry: String,
    /// Workload seed.
    pub seed: u64,
    /// Run result.
    #[serde(flatten)]
    pub result: StressTestResult,
    /// Write-log entries appended.
    pub writes_logged: u64,
    /// Bytes saved into write logs.
    pub bytes_logged: u64,
    /// Writes skipped as already logged.
    pub writes_skipped_duplicate: u64,
    /// Attempts rolled back and run again.
    pub retries: u64,
}

/// Runs the stress command.
pub fn run(config: &StressConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Running {} transactions over {} slots (depth {}, retry {})",
        config.transactions, config.slots, config.depth, config.retry
    );
    let result = run_stress(config);
    let verified = result.verified();
    let mismatches = result.mismatches;

    match format {
        "json" => {
            let output = StressOutput {
                retry: config.retry.to_string(),
                seed: config.seed,
                writes_logged: result.stats.writes_logged,
                bytes_logged: result.stats.bytes_logged,
                writes_skipped_duplicate: result.stats.writes_skipped_duplicate,
                retries: result.stats.retries,
                result,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            result.print_summary("Stress");
        }
    }

    if !verified {
        return Err(format!("{mismatches} transaction(s) disagreed with the model").into());
    }
    Ok(())
}

//! Scenario command implementation.

use rewind_core::Context;
use rewind_testkit::{Scenario, ScenarioReport};
use tracing::info;

/// Runs the scenario named `name`, or every scenario for `all`.
pub fn run(name: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenarios = match name {
        "all" => Scenario::ALL.to_vec(),
        other => vec![Scenario::from_name(other).ok_or_else(|| {
            format!("Unknown scenario '{other}' (expected a, b, c, nested-abort, cascade, all)")
        })?],
    };

    let reports: Vec<ScenarioReport> = scenarios
        .into_iter()
        .map(|scenario| {
            info!("Running scenario {}", scenario);
            scenario.run(&Context::default())
        })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            print_text_output(&reports);
        }
    }

    let failed = reports.iter().filter(|report| !report.passed).count();
    if failed > 0 {
        return Err(format!("{failed} scenario(s) failed").into());
    }
    Ok(())
}

fn print_text_output(reports: &[ScenarioReport]) {
    for report in reports {
        let status = if report.passed { "PASS" } else { "FAIL" };
        println!("[{}] {:<12} {}", status, report.name, report.description);
        println!(
            "       result: expected {}, got {}",
            report.expected_result, report.actual_result
        );
        println!(
            "       value:  expected {}, got {}",
            report.expected_value, report.actual_value
        );
        if !report.idle_after {
            println!("       context did not return to idle");
        }
    }
}

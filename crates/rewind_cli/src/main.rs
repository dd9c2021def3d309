//! Rewind CLI
//!
//! Command-line driver for the Rewind runtime.
//!
//! # Commands
//!
//! - `scenario` - Run the built-in end-to-end scenarios
//! - `stress` - Run a randomized nested-transaction workload against a model
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Rewind transactional memory tools.
#[derive(Parser)]
#[command(name = "rewind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run built-in scenarios
    Scenario {
        /// Scenario to run (a, b, c, nested-abort, cascade, all)
        #[arg(default_value = "all")]
        name: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a randomized workload and check it against a model
    Stress {
        /// Number of top-level transactions
        #[arg(short, long, default_value = "10000")]
        transactions: usize,

        /// Writes per transaction body
        #[arg(short, long, default_value = "16")]
        writes: usize,

        /// Number of tracked slots
        #[arg(long, default_value = "256")]
        slots: usize,

        /// Abort every n-th top-level transaction (0 = never)
        #[arg(short, long, default_value = "4")]
        abort_every: usize,

        /// Maximum nesting depth
        #[arg(short, long, default_value = "3")]
        depth: usize,

        /// Forced retry mode (no-retry, non-nested, nested-too)
        #[arg(short, long, default_value = "no-retry")]
        retry: String,

        /// Workload seed
        #[arg(long, default_value = "24301")]
        seed: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scenario { name, format } => {
            commands::scenario::run(&name, &format)?;
        }
        Commands::Stress {
            transactions,
            writes,
            slots,
            abort_every,
            depth,
            retry,
            seed,
            format,
        } => {
            let config = rewind_testkit::StressConfig {
                transactions,
                writes,
                slots,
                abort_every,
                depth,
                retry: retry.parse()?,
                seed,
            };
            commands::stress::run(&config, &format)?;
        }
        Commands::Version => {
            println!("Rewind CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Rewind Core v{}", rewind_core::VERSION);
        }
    }

    Ok(())
}

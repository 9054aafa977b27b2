//! TinyTorch - intrusive pointer diagnostics CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tinytorch::runtime::scenario::{run_lifecycle, run_stress, StressOptions};
use tinytorch::util::config::{load_config, OrderingPolicy};
use tinytorch::util::error::install_panic_hook;
use tinytorch::util::logger::{self, LogLevel};
use tinytorch::{NAME, VERSION};

/// Exercise the intrusive strong/weak pointers
#[derive(Parser, Debug)]
#[command(name = "tinytorch")]
#[command(author = "TinyTorch Team")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Memory ordering for count updates (seq-cst or acq-rel)
    #[arg(long, value_name = "POLICY")]
    ordering: Option<OrderingPolicy>,

    /// Log adopt / release_storage / deallocate events
    #[arg(long)]
    trace_lifecycle: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk one object through adopt, copy, observe and release
    Scenario,

    /// Race weak upgrades against final strong releases
    Stress {
        /// Producer threads (the same number of consumers is spawned)
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Objects created per producer
        #[arg(short, long, default_value_t = 10_000)]
        iterations: usize,

        /// Maximum extra strong copies per object
        #[arg(long, default_value_t = 3)]
        max_clones: usize,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config().context("Failed to load configuration")?;
    if let Some(ordering) = args.ordering {
        config.ordering = ordering;
    }
    if args.trace_lifecycle {
        config.trace_lifecycle = true;
        config.log_level = LogLevel::Trace;
    } else if args.verbose && config.log_level != LogLevel::Trace {
        config.log_level = LogLevel::Debug;
    }

    logger::init_with_level(config.log_level);
    install_panic_hook();
    config.install();

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Ordering policy: {}", config.ordering);
    }

    match args.command {
        Commands::Scenario => {
            let report = run_lifecycle().context("Lifecycle scenario failed")?;
            for step in &report.steps {
                let counts = match step.counts {
                    Some((strong, weak)) => format!("strong = {:<2} weak = {:<2}", strong, weak),
                    None => format!("{:<21}", "deallocated"),
                };
                println!(
                    "{:<16} {} released = {} destroyed = {}",
                    step.label, counts, step.storage_released, step.destroyed
                );
            }
            println!(
                "expired after strong drop: {}, lock empty: {}",
                report.expired_after_strong_drop, report.lock_after_strong_drop_empty
            );
            println!("{}", "scenario passed".green());
        }
        Commands::Stress {
            threads,
            iterations,
            max_clones,
        } => {
            let options = StressOptions {
                threads,
                iterations,
                max_clones,
                ..StressOptions::default()
            };
            let report = run_stress(&options).context("Stress run failed")?;
            println!(
                "created {} / destroyed {} / storage released {} / upgrades {} / expired {} in {:?}",
                report.created,
                report.destroyed,
                report.storage_released,
                report.upgrades,
                report.expired,
                report.elapsed
            );
            println!("{}", "stress passed".green());
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

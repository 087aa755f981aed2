//! condq CLI - drives a synthetic workload through the conditional execution queue

mod logging;
mod report;
mod settings;
mod workload;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "condq")]
#[command(about = "Conditional execution queue workload driver", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: condq.toml in the platform config dir)
    #[arg(long, global = true, env = "CONDQ_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload and print a report
    Run(RunArgs),

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Number of top-level items to submit
    #[arg(short, long)]
    items: Option<usize>,

    /// Nominal worker ceiling
    #[arg(short = 'w', long)]
    max_workers: Option<usize>,

    /// Bound concurrently leased workers (unbounded if unset)
    #[arg(short = 'l', long)]
    max_leases: Option<usize>,

    /// Base duration of each item in milliseconds
    #[arg(long)]
    work_ms: Option<u64>,

    /// Random extra duration per item, up to this many milliseconds
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Every n-th item expands the pool and waits on a child item
    #[arg(long)]
    nested_every: Option<usize>,

    /// Every n-th item panics
    #[arg(long)]
    fail_every: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(items) = self.items {
            settings.workload.items = items;
        }
        if let Some(max_workers) = self.max_workers {
            settings.queue.max_workers = max_workers;
        }
        if let Some(max_leases) = self.max_leases {
            settings.lease.max_leases = Some(max_leases);
        }
        if let Some(work_ms) = self.work_ms {
            settings.workload.work_ms = work_ms;
        }
        if let Some(jitter_ms) = self.jitter_ms {
            settings.workload.jitter_ms = jitter_ms;
        }
        if let Some(nested_every) = self.nested_every {
            settings.workload.nested_every = nested_every;
        }
        if let Some(fail_every) = self.fail_every {
            settings.workload.fail_every = fail_every;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging()?;
    info!("condq v{} (core v{})", VERSION, condq_core::VERSION);

    let mut settings = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut settings);
            let report = workload::run(&settings)?;
            report::print(&report, args.json)?;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

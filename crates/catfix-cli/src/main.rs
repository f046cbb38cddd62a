//! catfix - resumable catalog correction job
//!
//! Swaps the first two images of every product of one vendor and resets its
//! price to 1.75 × unit cost. Progress is kept in a JSON ledger, so the job
//! can be stopped at any point and started again.
//!
//! ## Usage
//!
//! - `catfix` / `catfix --dry-run`: log what would change, send nothing
//! - `catfix --apply [--limit N]`: send the corrections
//! - `catfix --reset ...`: forget recorded progress first
//! - `catfix status`: show ledger counts without touching the network

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use catalog_client::ShopifyClient;
use catfix_core::{AppConfig, Driver, RunConfig, RunMode, RunSummary, DEFAULT_LEDGER_PATH};
use clap::{Args, Parser, Subcommand};
use progress_ledger::{FileLedger, ProgressLedger};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "catfix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable image-order and price correction for one vendor's catalog", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Progress ledger file (default: logs/progress.json)
    #[arg(long, global = true, env = "CATFIX_LEDGER")]
    ledger: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Log planned changes without sending them (default)
    #[arg(long, conflicts_with = "apply")]
    dry_run: bool,

    /// Send the corrections
    #[arg(long)]
    apply: bool,

    /// Stop after N items have been attempted (0 = no limit)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Clear recorded progress before running
    #[arg(long)]
    reset: bool,
}

impl RunArgs {
    fn mode(&self) -> RunMode {
        if self.apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show recorded progress
    Status {
        /// Number of failed items to list
        #[arg(long, default_value = "10")]
        failures: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    catfix_core::init_tracing(cli.json, level);

    match cli.command {
        Some(Commands::Status { failures }) => {
            let path = cli
                .ledger
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH));
            cmd_status(&path, failures)
        }
        None => cmd_run(cli.ledger, &cli.run, cli.json).await,
    }
}

async fn cmd_run(ledger_override: Option<PathBuf>, args: &RunArgs, json: bool) -> Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let path = ledger_override.unwrap_or_else(|| config.ledger_path.clone());
    let (client, ledger) = prepare(&config, &path, args.reset)?;

    let run_config = RunConfig::new(args.mode())
        .with_limit(args.limit)
        .with_throttle(config.throttle)
        .with_retry(config.retry_policy());

    let mut driver = Driver::new(client, ledger, run_config);
    let summary = driver.run().await.context("Run aborted")?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Build the client and open the ledger. `--reset` clears progress only
/// once everything else is in place.
fn prepare(config: &AppConfig, path: &Path, reset: bool) -> Result<(ShopifyClient, FileLedger)> {
    let client =
        ShopifyClient::new(config.shopify_config()).context("Failed to create catalog client")?;

    let mut ledger = FileLedger::open(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;
    if reset {
        ledger.reset().context("Failed to reset ledger")?;
        info!(path = %path.display(), "progress cleared");
    }
    Ok((client, ledger))
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} ({})", summary.run_id, summary.mode);
    println!(
        "  done: {}  failed: {}  skipped: {}  already done: {}",
        summary.done, summary.failed, summary.skipped, summary.already_done
    );
    println!(
        "  requests: {}  retries: {}  rate limited: {}",
        summary.requests, summary.retries, summary.rate_limited
    );
    if summary.stopped_at_limit {
        println!("  stopped at limit; run again to continue");
    }
    if summary.mode == RunMode::DryRun {
        println!("  dry run: nothing was sent (use --apply)");
    }
}

fn cmd_status(path: &Path, failures: usize) -> Result<()> {
    let ledger = FileLedger::open(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;
    print!("{}", render_status(&ledger, failures));
    Ok(())
}

fn render_status(ledger: &FileLedger, failures: usize) -> String {
    let record = ledger.record();
    let counts = record.counts();
    let mut out = String::new();

    out.push_str(&format!("Ledger: {}\n", ledger.path().display()));
    out.push_str(&format!(
        "  done: {}  failed: {}  skipped: {}\n",
        counts.done, counts.failed, counts.skipped
    ));
    match &record.cursor {
        Some(cursor) => out.push_str(&format!("  resumes at cursor {cursor}\n")),
        None => out.push_str("  resumes at start of catalog\n"),
    }
    out.push_str(&format!(
        "  runs: {}  requests: {}  retries: {}  rate limited: {}\n",
        record.stats.runs, record.stats.requests, record.stats.retries, record.stats.rate_limited
    ));
    if let Some(updated) = record.updated_at {
        out.push_str(&format!("  updated: {}\n", updated.to_rfc3339()));
    }

    for (id, reasons) in record.failures().take(failures) {
        out.push_str(&format!("  failed {id}: {}\n", reasons.join("; ")));
    }
    if counts.failed > failures {
        out.push_str(&format!("  ... and {} more\n", counts.failed - failures));
    }
    out
}

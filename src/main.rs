//! closings-sync - MLS closed-sale merge and agent statistics
//!
//! Merges each market's freshly scraped closings into the previously
//! published dataset, deduplicated by MLS number, and republishes the
//! merged CSV together with per-agent and per-company statistics.
//!
//! Exit codes:
//!   0 - Success (including runs where nothing new was found)
//!   1 - Runtime error (unreadable input, unreachable snapshot, config or write failure)

mod analysis;
mod cli;
mod config;
mod error;
mod ingest;
mod models;
mod pipeline;
mod publish;
mod snapshot;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use models::MarketSummary;
use pipeline::PipelineOptions;
use publish::{DirectorySink, DryRunSink, Sink};
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    if let Err(e) = init_logging(&args) {
        eprintln!("Warning: {}", e);
    }

    info!("closings-sync v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_sync(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Sync failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .closings-sync.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to set directories, snapshot URL, policies, and column names.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run every selected market. Stops at the first fatal error.
async fn run_sync(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let jobs = pipeline::resolve_jobs(&config, &args.market)?;
    if jobs.is_empty() {
        println!(
            "ℹ️  No markets found in {} (expected <market>_closed.csv files).",
            config.general.data_dir.display()
        );
        return Ok(());
    }

    let options = PipelineOptions::from_config(&config, args.force, !args.quiet);

    let mut dry_run_sink = DryRunSink::default();
    let mut directory_sink;
    let sink: &mut dyn Sink = if args.dry_run {
        println!("🔍 Dry run: nothing will be written.");
        &mut dry_run_sink
    } else {
        directory_sink = DirectorySink::new(&config.general.output_dir)?;
        info!("Publishing to {}", directory_sink.root().display());
        &mut directory_sink
    };

    println!("📥 Syncing {} market(s)", jobs.len());
    println!("   Data: {}", config.general.data_dir.display());
    println!("   Output: {}", config.general.output_dir.display());
    println!("   Conflict policy: {}", config.merge.conflict_policy);

    let mut summaries = Vec::with_capacity(jobs.len());
    for job in &jobs {
        println!("\n🏘️  {} (snapshot: {})", job.name, job.snapshot);
        let summary = pipeline::run_market(job, &options, &mut *sink).await?;
        print_market_summary(&summary, args.dry_run);
        summaries.push(summary);
    }

    let published: usize = summaries.iter().filter(|s| s.published > 0).count();
    let added: usize = summaries.iter().map(|s| s.added).sum();

    println!("\n📊 Sync Summary:");
    println!("   Markets: {} | Published: {}", summaries.len(), published);
    println!("   New records: {}", added);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    if args.dry_run && !dry_run_sink.skipped.is_empty() {
        println!("\n   Files that would be written:");
        for name in &dry_run_sink.skipped {
            println!("     📄 {}", name);
        }
    }
    println!("\n✅ Sync complete!");

    Ok(())
}

fn print_market_summary(summary: &MarketSummary, dry_run: bool) {
    println!(
        "   Scraped: {} ({} rejected) | Published before: {}",
        summary.ingested, summary.rejected, summary.snapshot_records
    );
    println!(
        "   ➕ Added: {} | 🔁 Updated: {} | Total: {}",
        summary.added, summary.updated, summary.total_records
    );
    println!(
        "   Agents: {} | Companies: {}",
        summary.agents, summary.companies
    );

    if summary.published == 0 {
        println!("   ⏭️  Nothing new, skipped publishing (use --force to republish)");
    } else if dry_run {
        println!("   📝 Would publish {} files", summary.published);
    } else {
        println!("   📝 Published {} files", summary.published);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

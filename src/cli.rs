//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{Attribution, ConflictPolicy, PricePolicy};
use clap::Parser;
use std::path::PathBuf;

/// closings-sync - merge scraped MLS closings and rebuild agent stats
///
/// Reads `<market>_closed.csv` scraper output, merges it into the previously
/// published dataset by MLS number, and writes the merged CSV plus agent and
/// company statistics as JSON.
///
/// Examples:
///   closings-sync
///   closings-sync --market phoenix --snapshot-base https://cdn.example.com/closings
///   closings-sync --data-dir scrapes --output-dir public --pretty
///   closings-sync --dry-run --verbose
///   closings-sync --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .closings-sync.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the scraper CSVs
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory to write published artifacts to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only process these markets (comma-separated)
    ///
    /// Example: --market phoenix,tucson
    #[arg(short, long, value_name = "NAMES", value_delimiter = ',')]
    pub market: Vec<String>,

    /// Base URL of the published snapshots
    ///
    /// The snapshot of market `m` is fetched from `<URL>/<m>_closed.csv`.
    #[arg(long, value_name = "URL", env = "CLOSINGS_SNAPSHOT_BASE")]
    pub snapshot_base: Option<String>,

    /// Snapshot request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fail when a market has no published snapshot yet
    #[arg(long)]
    pub require_snapshot: bool,

    /// Which record wins when an MLS number is already published
    #[arg(long, value_name = "POLICY")]
    pub conflict_policy: Option<ConflictPolicy>,

    /// How records are credited to agents and companies
    #[arg(long, value_name = "MODE")]
    pub attribution: Option<Attribution>,

    /// What to do with records that have no usable price
    #[arg(long, value_name = "POLICY")]
    pub price_policy: Option<PricePolicy>,

    /// Publish even when no new records were merged
    #[arg(long)]
    pub force: bool,

    /// Ingest, merge and aggregate without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Indent JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .closings-sync.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref base) = self.snapshot_base {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err("Snapshot base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.market.iter().any(|m| m.trim().is_empty()) {
            return Err("Market names must not be empty".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

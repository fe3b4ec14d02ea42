//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.closings-sync.toml` files. The resolved [`Config`] is built once per
//! invocation and passed down explicitly.

use crate::models::{Attribution, ConflictPolicy, PricePolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".closings-sync.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Snapshot settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Merge settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// CSV column names.
    #[serde(default)]
    pub columns: ColumnsConfig,

    /// Explicit markets. When empty, markets are discovered in `data_dir`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markets: Vec<MarketConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the scraper output (`<market>_closed.csv`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory the published artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Indent JSON output.
    #[serde(default)]
    pub pretty: bool,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            pretty: false,
            verbose: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Where the previously published dataset comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Base URL; the snapshot of market `m` is `<base_url>/<m>_closed.csv`.
    /// When unset, the previous output in `output_dir` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Treat a missing snapshot as an empty dataset (first run).
    #[serde(default = "default_true")]
    pub allow_missing: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_timeout(),
            allow_missing: true,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Merge settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(default)]
    pub attribution: Attribution,

    #[serde(default)]
    pub price_policy: PricePolicy,

    /// Entries kept in the per-agent city and zip rankings.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            attribution: Attribution::default(),
            price_policy: PricePolicy::default(),
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

/// Header names of the columns the pipeline interprets.
///
/// Every other column is carried through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub mls: String,
    pub agent: String,
    pub agent_email: String,
    pub company: String,
    pub selling_agent: String,
    pub selling_agent_email: String,
    pub selling_company: String,
    pub price: String,
    pub close_date: String,
    pub city: String,
    pub zip: String,
    pub days_on_market: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            mls: "mls_number".to_string(),
            agent: "listing_agent_name".to_string(),
            agent_email: "listing_agent_email".to_string(),
            company: "listing_office_name".to_string(),
            selling_agent: "selling_agent_name".to_string(),
            selling_agent_email: "selling_agent_email".to_string(),
            selling_company: "selling_office_name".to_string(),
            price: "sold_price".to_string(),
            close_date: "close_date".to_string(),
            city: "city".to_string(),
            zip: "zip".to_string(),
            days_on_market: "days_on_market".to_string(),
        }
    }
}

/// One explicitly configured market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Market name; used as the artifact file prefix.
    pub name: String,

    /// Scraper CSV. Defaults to `<data_dir>/<name>_closed.csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    /// Snapshot URL or path. Overrides `[snapshot] base_url` for this market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }
        if args.pretty {
            self.general.pretty = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref base) = args.snapshot_base {
            self.snapshot.base_url = Some(base.trim_end_matches('/').to_string());
        }
        if let Some(timeout) = args.timeout {
            self.snapshot.timeout_seconds = timeout;
        }
        if args.require_snapshot {
            self.snapshot.allow_missing = false;
        }

        if let Some(policy) = args.conflict_policy {
            self.merge.conflict_policy = policy;
        }
        if let Some(attribution) = args.attribution {
            self.aggregate.attribution = attribution;
        }
        if let Some(price_policy) = args.price_policy {
            self.aggregate.price_policy = price_policy;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.data_dir, PathBuf::from("data"));
        assert_eq!(config.general.output_dir, PathBuf::from("output"));
        assert_eq!(config.merge.conflict_policy, ConflictPolicy::PreferNew);
        assert_eq!(config.aggregate.price_policy, PricePolicy::CountUnpriced);
        assert_eq!(config.columns.mls, "mls_number");
        assert!(config.snapshot.allow_missing);
        assert!(config.markets.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "public"
pretty = true

[snapshot]
base_url = "https://cdn.example.com/closings"
allow_missing = false

[merge]
conflict_policy = "prefer-existing"

[aggregate]
attribution = "both-sides"
top_n = 5

[columns]
mls = "MLS #"

[[markets]]
name = "phoenix"
input = "scrapes/phx.csv"

[[markets]]
name = "tucson"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("public"));
        assert!(config.general.pretty);
        assert_eq!(
            config.snapshot.base_url.as_deref(),
            Some("https://cdn.example.com/closings")
        );
        assert!(!config.snapshot.allow_missing);
        assert_eq!(config.snapshot.timeout_seconds, 30);
        assert_eq!(config.merge.conflict_policy, ConflictPolicy::PreferExisting);
        assert_eq!(config.aggregate.attribution, Attribution::BothSides);
        assert_eq!(config.aggregate.top_n, 5);
        assert_eq!(config.columns.mls, "MLS #");
        assert_eq!(config.columns.agent, "listing_agent_name");
        assert_eq!(config.markets.len(), 2);
        assert_eq!(
            config.markets[0].input.as_deref(),
            Some(Path::new("scrapes/phx.csv"))
        );
        assert!(config.markets[1].input.is_none());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[merge]"));
        assert!(toml_str.contains("[columns]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.columns, ColumnsConfig::default());
    }

    #[test]
    fn test_merge_with_args() {
        use clap::Parser;

        let args = crate::cli::Args::try_parse_from([
            "closings-sync",
            "--output-dir",
            "public",
            "--snapshot-base",
            "https://cdn.example.com/closings/",
            "--require-snapshot",
            "--conflict-policy",
            "prefer-existing",
        ])
        .unwrap();

        let mut config = Config::default();
        config.aggregate.top_n = 3;
        config.merge_with_args(&args);

        assert_eq!(config.general.output_dir, PathBuf::from("public"));
        assert_eq!(config.general.data_dir, PathBuf::from("data"));
        assert_eq!(
            config.snapshot.base_url.as_deref(),
            Some("https://cdn.example.com/closings")
        );
        assert!(!config.snapshot.allow_missing);
        assert_eq!(config.merge.conflict_policy, ConflictPolicy::PreferExisting);
        assert_eq!(config.aggregate.attribution, Attribution::Listing);
        assert_eq!(config.aggregate.top_n, 3);
    }
}

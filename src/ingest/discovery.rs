//! Market discovery in the scraper's data directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// File name suffix the scraper uses for closed-sale exports.
pub const CLOSED_SUFFIX: &str = "_closed.csv";

/// A scraper export found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredMarket {
    pub name: String,
    pub input: PathBuf,
}

/// Find every `<market>_closed.csv` directly inside `data_dir`, sorted by name.
pub fn discover_markets(data_dir: &Path) -> Result<Vec<DiscoveredMarket>> {
    if !data_dir.is_dir() {
        anyhow::bail!("Data directory does not exist: {}", data_dir.display());
    }

    let mut markets = Vec::new();

    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1) {
        let entry = entry
            .with_context(|| format!("Failed to list data directory: {}", data_dir.display()))?;

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        match file_name.strip_suffix(CLOSED_SUFFIX) {
            Some(name) if !name.is_empty() => {
                debug!("Discovered market '{}' at {}", name, entry.path().display());
                markets.push(DiscoveredMarket {
                    name: name.to_string(),
                    input: entry.path().to_path_buf(),
                });
            }
            _ => debug!("Ignoring {}", entry.path().display()),
        }
    }

    markets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(markets)
}

/// Conventional input path for a market.
pub fn market_input_path(data_dir: &Path, market: &str) -> PathBuf {
    data_dir.join(format!("{}{}", market, CLOSED_SUFFIX))
}

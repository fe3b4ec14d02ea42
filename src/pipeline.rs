//! Per-market sync workflow.
//!
//! One market runs ingest, snapshot, merge, aggregate and publish in that
//! order. Markets are independent and run one after another.

use crate::analysis::{self, AggregateOptions};
use crate::config::Config;
use crate::ingest::{self, ColumnMap};
use crate::models::{ConflictPolicy, MarketSummary};
use crate::publish::{self, Sink};
use crate::snapshot::{self, SnapshotOptions, SnapshotSource};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Everything needed to sync one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketJob {
    pub name: String,
    pub input: PathBuf,
    pub snapshot: SnapshotSource,
}

/// Settings shared by every market of an invocation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub columns: ColumnMap,
    pub conflict_policy: ConflictPolicy,
    pub aggregate: AggregateOptions,
    pub snapshot: SnapshotOptions,
    /// Publish even when the merge added nothing.
    pub force: bool,
    pub pretty: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, force: bool, show_progress: bool) -> Self {
        Self {
            columns: ColumnMap::from(&config.columns),
            conflict_policy: config.merge.conflict_policy,
            aggregate: AggregateOptions::from(&config.aggregate),
            snapshot: SnapshotOptions {
                timeout_seconds: config.snapshot.timeout_seconds,
                allow_missing: config.snapshot.allow_missing,
                show_progress,
            },
            force,
            pretty: config.general.pretty,
        }
    }
}

/// Work out which markets to run and where their inputs live.
///
/// Configured `[[markets]]` take precedence over discovery. A non-empty
/// `filter` restricts the result to the named markets; naming a market that
/// does not exist is an error.
pub fn resolve_jobs(config: &Config, filter: &[String]) -> Result<Vec<MarketJob>> {
    let mut jobs: Vec<MarketJob> = if config.markets.is_empty() {
        ingest::discover_markets(&config.general.data_dir)?
            .into_iter()
            .map(|market| MarketJob {
                snapshot: snapshot_source(config, &market.name, None),
                name: market.name,
                input: market.input,
            })
            .collect()
    } else {
        config
            .markets
            .iter()
            .map(|market| MarketJob {
                name: market.name.clone(),
                input: market.input.clone().unwrap_or_else(|| {
                    ingest::market_input_path(&config.general.data_dir, &market.name)
                }),
                snapshot: snapshot_source(config, &market.name, market.snapshot.as_deref()),
            })
            .collect()
    };

    if !filter.is_empty() {
        if let Some(unknown) = filter
            .iter()
            .find(|name| !jobs.iter().any(|job| &job.name == *name))
        {
            anyhow::bail!("Unknown market: {}", unknown);
        }
        jobs.retain(|job| filter.contains(&job.name));
    }

    debug!(
        "Resolved markets: {:?}",
        jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>()
    );
    Ok(jobs)
}

fn snapshot_source(config: &Config, market: &str, explicit: Option<&str>) -> SnapshotSource {
    let file_name = publish::dataset_name(market);

    match (explicit, config.snapshot.base_url.as_deref()) {
        (Some(location), _) => SnapshotSource::parse(location),
        (None, Some(base)) => SnapshotSource::Remote(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            file_name
        )),
        (None, None) => SnapshotSource::Local(config.general.output_dir.join(file_name)),
    }
}

/// Sync one market and publish its artifacts through `sink`.
pub async fn run_market(
    job: &MarketJob,
    options: &PipelineOptions,
    sink: &mut dyn Sink,
) -> Result<MarketSummary> {
    info!("Processing market '{}'", job.name);

    let scraped = ingest::read_records(&job.input, &options.columns)
        .with_context(|| format!("Failed to ingest market '{}'", job.name))?;

    let snapshot = snapshot::load_snapshot(&job.snapshot, &options.columns, &options.snapshot)
        .await
        .with_context(|| format!("Failed to load snapshot for market '{}'", job.name))?;
    if !snapshot.found {
        info!("No published data for '{}' yet, treating as first run", job.name);
    }

    let mut summary = MarketSummary {
        market: job.name.clone(),
        ingested: scraped.records.len(),
        rejected: scraped.rejected.len(),
        snapshot_records: snapshot.records.len(),
        ..MarketSummary::default()
    };

    let outcome = analysis::merge(snapshot.records, scraped.records, options.conflict_policy);
    info!(
        "Merged '{}': {} added, {} updated, {} unchanged, {} total",
        job.name,
        outcome.added,
        outcome.updated,
        outcome.unchanged,
        outcome.records.len()
    );

    summary.added = outcome.added;
    summary.updated = outcome.updated;
    summary.total_records = outcome.records.len();

    let aggregates = analysis::aggregate(&outcome.records, &options.aggregate);
    summary.agents = aggregates.agents.len();
    summary.companies = aggregates.companies.len();
    if aggregates.skipped_unpriced > 0 {
        debug!(
            "{} unpriced records left out of '{}' statistics",
            aggregates.skipped_unpriced, job.name
        );
    }
    if aggregates.is_empty() {
        warn!("Market '{}' has no records to aggregate", job.name);
    }

    if !outcome.has_new_records() && !options.force {
        info!("No new records for '{}', skipping publish", job.name);
        return Ok(summary);
    }

    let artifacts = publish::render_market(
        &job.name,
        &outcome.records,
        &aggregates,
        &options.columns,
        options.pretty,
    )?;

    for artifact in &artifacts {
        sink.put(&artifact.name, &artifact.bytes)
            .with_context(|| format!("Failed to publish {}", artifact.name))?;
    }
    summary.published = artifacts.len();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::publish::{DirectorySink, MemorySink};
    use std::fs;
    use std::path::Path;

    const HEADER: &str = "mls_number,listing_agent_name,listing_office_name,sold_price,close_date";

    fn write_csv(path: &Path, rows: &[&str]) {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        fs::write(path, text).unwrap();
    }

    fn options() -> PipelineOptions {
        PipelineOptions::from_config(&Config::default(), false, false)
    }

    fn local_job(dir: &Path) -> MarketJob {
        MarketJob {
            name: "phoenix".to_string(),
            input: dir.join("phoenix_closed.csv"),
            snapshot: SnapshotSource::Local(dir.join("out").join("phoenix_closed.csv")),
        }
    }

    #[test]
    fn test_resolve_discovered_markets() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(&dir.path().join("tucson_closed.csv"), &[]);
        write_csv(&dir.path().join("phoenix_closed.csv"), &[]);

        let mut config = Config::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.general.output_dir = PathBuf::from("public");

        let jobs = resolve_jobs(&config, &[]).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "phoenix");
        assert_eq!(
            jobs[0].snapshot,
            SnapshotSource::Local(PathBuf::from("public/phoenix_closed.csv"))
        );

        config.snapshot.base_url = Some("https://cdn.example.com/closings/".to_string());
        let jobs = resolve_jobs(&config, &["tucson".to_string()]).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].snapshot,
            SnapshotSource::Remote("https://cdn.example.com/closings/tucson_closed.csv".to_string())
        );
    }

    #[test]
    fn test_resolve_configured_markets() {
        let mut config = Config::default();
        config.markets = vec![
            MarketConfig {
                name: "phoenix".to_string(),
                input: Some(PathBuf::from("scrapes/phx.csv")),
                snapshot: Some("https://mirror.example.com/phx.csv".to_string()),
            },
            MarketConfig {
                name: "tucson".to_string(),
                input: None,
                snapshot: None,
            },
        ];

        let jobs = resolve_jobs(&config, &[]).unwrap();
        assert_eq!(jobs[0].input, PathBuf::from("scrapes/phx.csv"));
        assert_eq!(
            jobs[0].snapshot,
            SnapshotSource::Remote("https://mirror.example.com/phx.csv".to_string())
        );
        assert_eq!(jobs[1].input, PathBuf::from("data/tucson_closed.csv"));
    }

    #[test]
    fn test_resolve_unknown_market_fails() {
        let mut config = Config::default();
        config.markets = vec![MarketConfig {
            name: "phoenix".to_string(),
            input: None,
            snapshot: None,
        }];

        assert!(resolve_jobs(&config, &["mesa".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_first_run_publishes_everything() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            &dir.path().join("phoenix_closed.csv"),
            &[
                "100,Agent A,Desert Realty,250000,01/10/2025",
                "200,Agent B,Valley Homes,300000,01/12/2025",
                "300,,Valley Homes,100000,01/13/2025",
            ],
        );

        let mut sink = MemorySink::default();
        let summary = run_market(&local_job(dir.path()), &options(), &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.ingested, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.snapshot_records, 0);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.agents, 2);
        assert_eq!(summary.companies, 2);
        assert_eq!(summary.published, 3);
        assert!(sink.files.contains_key("phoenix_closed.csv"));
        assert!(sink.files.contains_key("phoenix_agents.json"));
        assert!(sink.files.contains_key("phoenix_companies.json"));
    }

    #[tokio::test]
    async fn test_merge_against_published_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let job = local_job(dir.path());
        let mut sink = DirectorySink::new(dir.path().join("out")).unwrap();

        write_csv(&job.input, &["100,Agent A,Desert Realty,200000,01/10/2025"]);
        run_market(&job, &options(), &mut sink).await.unwrap();

        write_csv(
            &job.input,
            &[
                "100,Agent A,Desert Realty,250000,01/10/2025",
                "200,Agent B,Valley Homes,300000,01/12/2025",
            ],
        );
        let summary = run_market(&job, &options(), &mut sink).await.unwrap();

        assert_eq!(summary.snapshot_records, 1);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.total_records, 2);

        let agents: serde_json::Value = serde_json::from_slice(
            &fs::read(dir.path().join("out").join("phoenix_agents.json")).unwrap(),
        )
        .unwrap();
        let volumes: Vec<u64> = agents["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["total_volume"].as_u64().unwrap())
            .collect();
        assert_eq!(volumes, vec![300_000, 250_000]);
    }

    #[tokio::test]
    async fn test_nothing_new_skips_publish_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let job = local_job(dir.path());
        let mut sink = DirectorySink::new(dir.path().join("out")).unwrap();

        write_csv(&job.input, &["100,Agent A,Desert Realty,200000,01/10/2025"]);
        run_market(&job, &options(), &mut sink).await.unwrap();
        let published = fs::read(dir.path().join("out").join("phoenix_agents.json")).unwrap();

        let summary = run_market(&job, &options(), &mut sink).await.unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.published, 0);

        let mut forced = options();
        forced.force = true;
        let summary = run_market(&job, &forced, &mut sink).await.unwrap();
        assert_eq!(summary.published, 3);

        let republished = fs::read(dir.path().join("out").join("phoenix_agents.json")).unwrap();
        assert_eq!(published, republished);
    }

    #[tokio::test]
    async fn test_required_snapshot_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let job = local_job(dir.path());
        write_csv(&job.input, &["100,Agent A,Desert Realty,200000,01/10/2025"]);

        let mut strict = options();
        strict.snapshot.allow_missing = false;

        let mut sink = MemorySink::default();
        assert!(run_market(&job, &strict, &mut sink).await.is_err());
        assert!(sink.files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MemorySink::default();
        assert!(run_market(&local_job(dir.path()), &options(), &mut sink)
            .await
            .is_err());
    }
}

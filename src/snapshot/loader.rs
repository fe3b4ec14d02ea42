//! Snapshot loading.
//!
//! The snapshot is the merged CSV published by the previous run, either on
//! a remote host (fetched over HTTP) or in the local output directory.

use crate::error::{ParseError, SnapshotError};
use crate::ingest::{self, ColumnMap, IngestReport};
use crate::models::Transaction;
use indicatif::ProgressBar;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    Remote(String),
    Local(PathBuf),
}

impl SnapshotSource {
    /// `http://` and `https://` locations are remote, anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            SnapshotSource::Remote(location.to_string())
        } else {
            SnapshotSource::Local(PathBuf::from(location))
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Remote(url) => write!(f, "{}", url),
            SnapshotSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Options for loading a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Request timeout for remote snapshots.
    pub timeout_seconds: u64,
    /// Treat a missing snapshot as an empty dataset.
    pub allow_missing: bool,
    /// Whether to show a spinner while fetching.
    pub show_progress: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            allow_missing: true,
            show_progress: false,
        }
    }
}

/// The previously published records.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub records: Vec<Transaction>,
    /// Rows of the published file that no longer validate.
    pub rejected: Vec<ParseError>,
    /// False when no snapshot existed and an empty one was substituted.
    pub found: bool,
}

impl Snapshot {
    fn missing(source: &SnapshotSource, options: &SnapshotOptions) -> Result<Self, SnapshotError> {
        if options.allow_missing {
            warn!("No snapshot at {}, starting from an empty dataset", source);
            Ok(Self::default())
        } else {
            Err(SnapshotError::NotFound(source.to_string()))
        }
    }

    fn from_report(report: IngestReport) -> Self {
        Self {
            records: report.records,
            rejected: report.rejected,
            found: true,
        }
    }
}

/// Load a snapshot from its source.
pub async fn load_snapshot(
    source: &SnapshotSource,
    columns: &ColumnMap,
    options: &SnapshotOptions,
) -> Result<Snapshot, SnapshotError> {
    info!("Loading snapshot: {}", source);

    let snapshot = match source {
        SnapshotSource::Remote(url) => fetch_remote(url, source, columns, options).await?,
        SnapshotSource::Local(path) => {
            if !path.exists() {
                return Snapshot::missing(source, options);
            }
            let report = ingest::read_records(path, columns).map_err(|e| {
                SnapshotError::Unreadable {
                    location: source.to_string(),
                    source: e,
                }
            })?;
            Snapshot::from_report(report)
        }
    };

    if !snapshot.rejected.is_empty() {
        warn!(
            "{} rows of the snapshot failed validation and were dropped",
            snapshot.rejected.len()
        );
    }
    info!("Snapshot holds {} records", snapshot.records.len());

    Ok(snapshot)
}

async fn fetch_remote(
    url: &str,
    source: &SnapshotSource,
    columns: &ColumnMap,
    options: &SnapshotOptions,
) -> Result<Snapshot, SnapshotError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(options.timeout_seconds))
        .build()
        .map_err(SnapshotError::Client)?;

    let spinner = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_message(format!("Fetching {}", url));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let result = download(&client, url).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match result? {
        Some(body) => {
            debug!("Fetched {} bytes from {}", body.len(), url);
            let report =
                ingest::parse_str(&body, columns).map_err(|e| SnapshotError::Unreadable {
                    location: url.to_string(),
                    source: e,
                })?;
            Ok(Snapshot::from_report(report))
        }
        None => Snapshot::missing(source, options),
    }
}

/// GET the body; `Ok(None)` on 404.
async fn download(client: &reqwest::Client, url: &str) -> Result<Option<String>, SnapshotError> {
    let request_error = |source: reqwest::Error| SnapshotError::Request {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(request_error)?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(SnapshotError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response.text().await.map_err(request_error)?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SNAPSHOT_CSV: &str = "mls_number,listing_agent_name,sold_price,close_date\n\
100,Agent A,200000,2024-05-01\n\
101,Agent B,310000,2024-05-02\n";

    #[test]
    fn test_source_parse() {
        assert_eq!(
            SnapshotSource::parse("https://cdn.example.com/phoenix_closed.csv"),
            SnapshotSource::Remote("https://cdn.example.com/phoenix_closed.csv".to_string())
        );
        assert_eq!(
            SnapshotSource::parse("output/phoenix_closed.csv"),
            SnapshotSource::Local(PathBuf::from("output/phoenix_closed.csv"))
        );
    }

    #[test]
    fn test_missing_local_snapshot_is_empty() {
        let source = SnapshotSource::Local(PathBuf::from("/no/such/phoenix_closed.csv"));
        let snapshot = tokio_test::block_on(load_snapshot(
            &source,
            &ColumnMap::default(),
            &SnapshotOptions::default(),
        ))
        .unwrap();

        assert!(!snapshot.found);
        assert!(snapshot.records.is_empty());
    }

    #[test]
    fn test_missing_local_snapshot_can_be_fatal() {
        let source = SnapshotSource::Local(PathBuf::from("/no/such/phoenix_closed.csv"));
        let options = SnapshotOptions {
            allow_missing: false,
            ..SnapshotOptions::default()
        };
        let err = tokio_test::block_on(load_snapshot(&source, &ColumnMap::default(), &options))
            .unwrap_err();

        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[test]
    fn test_local_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("phoenix_closed.csv");
        std::fs::write(&file, SNAPSHOT_CSV).unwrap();

        let snapshot = tokio_test::block_on(load_snapshot(
            &SnapshotSource::Local(file),
            &ColumnMap::default(),
            &SnapshotOptions::default(),
        ))
        .unwrap();

        assert!(snapshot.found);
        assert_eq!(snapshot.records.len(), 2);
    }

    #[tokio::test]
    async fn test_remote_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/phoenix_closed.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SNAPSHOT_CSV))
            .mount(&server)
            .await;

        let source = SnapshotSource::Remote(format!("{}/phoenix_closed.csv", server.uri()));
        let snapshot = load_snapshot(&source, &ColumnMap::default(), &SnapshotOptions::default())
            .await
            .unwrap();

        assert!(snapshot.found);
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[1].agent, "Agent B");
    }

    #[tokio::test]
    async fn test_remote_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = SnapshotSource::Remote(format!("{}/tucson_closed.csv", server.uri()));

        let snapshot = load_snapshot(&source, &ColumnMap::default(), &SnapshotOptions::default())
            .await
            .unwrap();
        assert!(!snapshot.found);

        let strict = SnapshotOptions {
            allow_missing: false,
            ..SnapshotOptions::default()
        };
        let err = load_snapshot(&source, &ColumnMap::default(), &strict)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remote_server_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = SnapshotSource::Remote(format!("{}/phoenix_closed.csv", server.uri()));
        let err = load_snapshot(&source, &ColumnMap::default(), &SnapshotOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SnapshotError::Status { status, .. } if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fatal() {
        let source = SnapshotSource::Remote("http://127.0.0.1:9/phoenix_closed.csv".to_string());
        let options = SnapshotOptions {
            timeout_seconds: 2,
            ..SnapshotOptions::default()
        };
        let err = load_snapshot(&source, &ColumnMap::default(), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::Request { .. }));
    }
}

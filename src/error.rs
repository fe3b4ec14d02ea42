//! Typed errors for the pipeline stages.
//!
//! Row-level problems are [`ParseError`] values collected alongside the
//! good records. The other types are fatal for the market being processed.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single CSV row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing required value")]
    Missing,
    #[error("unrecognised date '{0}'")]
    InvalidDate(String),
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// A rejected row. `row` is 1-based and excludes the header line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}, column '{column}': {kind}")]
pub struct ParseError {
    pub row: usize,
    pub column: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(row: usize, column: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            row,
            column: column.into(),
            kind,
        }
    }
}

/// The input as a whole could not be read.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read CSV header: {0}")]
    Header(#[source] csv::Error),

    #[error("required column '{0}' missing from header")]
    MissingColumn(String),
}

/// The previously published snapshot could not be obtained.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found at {0}")]
    NotFound(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("snapshot request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("snapshot request to {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("snapshot at {location} is unreadable: {source}")]
    Unreadable {
        location: String,
        #[source]
        source: IngestError,
    },
}

/// An artifact could not be rendered or stored.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize {artifact}: {source}")]
    Json {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {artifact}: {source}")]
    Csv {
        artifact: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(3, "mls_number", ParseErrorKind::Missing);
        assert_eq!(
            err.to_string(),
            "row 3, column 'mls_number': missing required value"
        );

        let err = ParseError::new(
            7,
            "close_date",
            ParseErrorKind::InvalidDate("yesterday".to_string()),
        );
        assert!(err.to_string().contains("unrecognised date 'yesterday'"));
    }

    #[test]
    fn test_missing_column_display() {
        let err = IngestError::MissingColumn("mls_number".to_string());
        assert_eq!(
            err.to_string(),
            "required column 'mls_number' missing from header"
        );
    }
}

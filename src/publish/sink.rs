//! Artifact storage.

use crate::error::PublishError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Destination for published artifacts.
pub trait Sink {
    /// Store `bytes` under `name`, replacing any previous content.
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), PublishError>;
}

/// Writes artifacts into a directory.
///
/// Each file is written to a temporary file in the same directory and then
/// renamed over the target, so readers never see a partial artifact.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PublishError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| PublishError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Sink for DirectorySink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), PublishError> {
        let path = self.root.join(name);
        let write_error = |source: std::io::Error| PublishError::Write {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_error)?;
        tmp.write_all(bytes).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(&path).map_err(|e| write_error(e.error))?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Discards artifacts, logging what would have been written.
#[derive(Debug, Default)]
pub struct DryRunSink {
    pub skipped: Vec<String>,
}

impl Sink for DryRunSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), PublishError> {
        debug!("Dry run: not writing {} ({} bytes)", name, bytes.len());
        self.skipped.push(name.to_string());
        Ok(())
    }
}

/// Keeps artifacts in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: std::collections::BTreeMap<String, Vec<u8>>,
}

#[cfg(test)]
impl Sink for MemorySink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), PublishError> {
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

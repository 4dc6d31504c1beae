//! Offline snapshot file.
//!
//! Newline-delimited JSON, one [`NodePayload`] per line. A remote run deletes
//! the file and appends every node it emits; a replay run reads it back in
//! file order and never writes to it.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::models::NodePayload;

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = ".cache/offline-firestore.txt";

#[derive(Debug, Clone)]
pub struct OfflineSnapshot {
    path: PathBuf,
}

impl Default for OfflineSnapshot {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}

impl OfflineSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Delete the snapshot if present.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed previous offline snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove offline snapshot: {}", self.path.display())
            }),
        }
    }

    /// Append one node as a single line. The file is opened and closed per call.
    pub fn append(&self, node: &NodePayload) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory: {}", parent.display())
                })?;
            }
        }

        let mut line = serde_json::to_string(node)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| {
                format!("Failed to open offline snapshot: {}", self.path.display())
            })?;
        file.write_all(line.as_bytes()).with_context(|| {
            format!("Failed to append to offline snapshot: {}", self.path.display())
        })?;

        tracing::debug!(id = %node.id, "Appended node to offline snapshot");
        Ok(())
    }

    /// Read every line in file order.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        let file = fs::File::open(&self.path)
            .with_context(|| format!("Failed to open offline snapshot: {}", self.path.display()))?;

        BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read offline snapshot: {}", self.path.display()))
    }
}

/// Parse one snapshot line. `line_no` is 1-based and only used in the error.
pub fn parse_line(line: &str, line_no: usize) -> Result<NodePayload> {
    serde_json::from_str(line)
        .with_context(|| format!("Malformed offline snapshot line {}", line_no))
}

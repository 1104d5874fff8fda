//! Error types for the partition engine.
//!
//! Three families matter operationally:
//! - configuration errors abort the whole run before any chunk is read,
//! - malformed lines (strict mode only) abort the chunk that contains them,
//! - I/O errors abort the chunk (or merge bucket) being written.

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, PartitionError>;

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("{what} not found: {}", path.display())]
    MissingPath { what: &'static str, path: PathBuf },

    #[error("{what} is not a directory: {}", path.display())]
    NotADirectory { what: &'static str, path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed line {line_no} ({reason}): {line}")]
    MalformedLine {
        line_no: u64,
        reason: &'static str,
        line: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PartitionError {
    /// True for errors that must stop a run before any chunk is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingPath { .. } | Self::NotADirectory { .. } | Self::InvalidConfig(_)
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to a bare `std::io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| PartitionError::io(path, e))
    }
}

/// Ensure a required input path exists.
pub fn require_path(what: &'static str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PartitionError::MissingPath {
            what,
            path: path.to_path_buf(),
        })
    }
}

/// Ensure a required input path exists and is a directory.
pub fn require_dir(what: &'static str, path: &Path) -> Result<()> {
    require_path(what, path)?;
    if path.is_dir() {
        Ok(())
    } else {
        Err(PartitionError::NotADirectory {
            what,
            path: path.to_path_buf(),
        })
    }
}

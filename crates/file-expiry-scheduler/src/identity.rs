//! File identity capture.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ExpiryError;

/// The `(absolute path, inode)` pair a job is keyed on.
///
/// Always captured fresh: a file can be replaced at the same path between
/// calls, and only the inode tells the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIdentity {
    /// Absolute (but not canonicalized) path.
    pub path: PathBuf,
    /// Inode number at capture time.
    pub inode: u64,
}

impl FileIdentity {
    /// Build an identity from already-known parts.
    pub fn new(path: impl Into<PathBuf>, inode: u64) -> Self {
        Self {
            path: path.into(),
            inode,
        }
    }

    /// Read the current identity of `path` from filesystem metadata.
    ///
    /// Relative paths are made absolute against the working directory.
    /// Symlinks are followed, matching what the reaper sees when it stats
    /// the same path. Paths that are not valid UTF-8 are rejected: the job
    /// body is text and could not name them exactly.
    pub async fn resolve(path: &Path) -> Result<Self, ExpiryError> {
        if path.as_os_str().is_empty() {
            return Err(ExpiryError::InvalidInput("path is empty".to_string()));
        }

        let absolute = std::path::absolute(path).map_err(|source| ExpiryError::PathResolution {
            path: path.to_path_buf(),
            source,
        })?;

        if absolute.to_str().is_none() {
            return Err(ExpiryError::InvalidInput(format!(
                "path is not valid UTF-8: {}",
                absolute.display()
            )));
        }

        let metadata = tokio::fs::metadata(&absolute)
            .await
            .map_err(|source| ExpiryError::PathResolution {
                path: absolute.clone(),
                source,
            })?;

        Ok(Self {
            inode: inode_of(&metadata),
            path: absolute,
        })
    }
}

#[cfg(unix)]
pub(crate) fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
pub(crate) fn inode_of(_metadata: &std::fs::Metadata) -> u64 {
    0
}

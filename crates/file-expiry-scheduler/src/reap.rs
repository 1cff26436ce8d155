//! The job-side half: delete a file only if it is still the same file.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::ExpiryError;
use crate::identity::inode_of;

/// What the reaper did when the job fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReapOutcome {
    /// The file matched and was removed.
    Deleted,
    /// Something else now lives at the path; it was left alone.
    InodeMismatch { found: u64 },
    /// Nothing exists at the path any more.
    Missing,
    /// The path is a directory; only files are expired.
    NotAFile,
}

/// Remove `path` if its inode is still `inode`.
///
/// Metadata is read through symlinks, the same way the scheduler captured
/// the inode, but the path itself is what gets unlinked.
pub async fn reap_if_inode_matches(path: &Path, inode: u64) -> Result<ReapOutcome, ExpiryError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "expired file already gone");
            return Ok(ReapOutcome::Missing);
        }
        Err(source) => {
            return Err(ExpiryError::PathResolution {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if metadata.is_dir() {
        return Ok(ReapOutcome::NotAFile);
    }

    let found = inode_of(&metadata);
    if found != inode {
        info!(path = %path.display(), expected = inode, found, "file was replaced, not deleting");
        return Ok(ReapOutcome::InodeMismatch { found });
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), inode, "deleted expired file");
            Ok(ReapOutcome::Deleted)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReapOutcome::Missing),
        Err(source) => Err(ExpiryError::PathResolution {
            path: path.to_path_buf(),
            source,
        }),
    }
}

//! Identity encoding for job bodies.
//!
//! The queue has no structured metadata, so a job's identity is a literal
//! marker inside its command body:
//!
//! ```text
//! <helper> <shell-quoted absolute path> <inode>[ <minutes>]
//! ```
//!
//! The marker is everything up to and including the inode. The optional
//! minutes suffix only records that the job was scheduled by duration.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use shell_escape::unix::escape;

use crate::FileIdentity;

/// Helper installed by the file manager integration.
pub const DEFAULT_HELPER: &str = "/opt/file-expiry/delete-if-inode-matches.sh";

/// A `(path, inode)` marker ready to be embedded or searched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker(String);

impl Marker {
    /// The marker text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `body` contains this marker as a whole token run.
    ///
    /// A plain substring test would let inode `12` match a body written for
    /// inode `123`, so the occurrence must be delimited by whitespace (or the
    /// start/end of the body) on both sides.
    pub fn is_in(&self, body: &str) -> bool {
        body.match_indices(self.0.as_str()).any(|(start, matched)| {
            let before = body[..start].chars().next_back();
            let after = body[start + matched.len()..].chars().next();
            before.is_none_or(char::is_whitespace) && after.is_none_or(char::is_whitespace)
        })
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds markers and job bodies around a fixed helper command.
#[derive(Debug, Clone)]
pub struct MarkerEncoder {
    helper: String,
}

impl Default for MarkerEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_HELPER)
    }
}

impl MarkerEncoder {
    /// Create an encoder for the given helper command prefix.
    ///
    /// The helper is embedded verbatim; it is configuration, not user input.
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    /// The helper command prefix.
    pub fn helper(&self) -> &str {
        &self.helper
    }

    /// Encode the marker for `path` at `inode`.
    pub fn encode_marker(&self, path: &Path, inode: u64) -> Marker {
        Marker(format!("{} {} {}", self.helper, quote_path(path), inode))
    }

    /// Encode the marker for a captured identity.
    pub fn marker_for(&self, identity: &FileIdentity) -> Marker {
        self.encode_marker(&identity.path, identity.inode)
    }

    /// Build the exact command body to submit to the queue.
    pub fn build_schedule_command(&self, path: &Path, inode: u64, minutes: Option<u64>) -> String {
        let marker = self.encode_marker(path, inode);
        match minutes {
            Some(minutes) => format!("{} {}", marker, minutes),
            None => marker.0,
        }
    }
}

/// Paths reaching here are UTF-8; `FileIdentity::resolve` rejects the rest.
fn quote_path(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    escape(Cow::Borrowed(&path_str)).into_owned()
}

//! The job queue contract.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::QueueError;

/// Opaque job identifier assigned by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One row of the queue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// Job identifier.
    pub id: JobId,
    /// Human-readable run time, as the backend prints it.
    pub schedule: String,
    /// Queue letter (`=` while the job is running).
    pub queue: char,
    /// Owning user.
    pub owner: String,
}

/// A batch job queue with `at`-style primitives.
///
/// Every call goes to the backend; implementations must not cache, since
/// other actors mutate the queue between calls.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Queue `command` to run once at `when`.
    ///
    /// `when` is passed through unvalidated; a bad spec is a
    /// [`QueueError::Rejected`].
    async fn submit(&self, command: &str, when: &str) -> Result<JobId, QueueError>;

    /// List pending jobs in backend order.
    async fn list_jobs(&self) -> Result<Vec<QueueEntry>, QueueError>;

    /// Fetch the full command body of a job.
    async fn inspect_job(&self, id: &JobId) -> Result<String, QueueError>;

    /// Remove a job. A job that is already gone is [`QueueError::NotFound`].
    async fn remove_job(&self, id: &JobId) -> Result<(), QueueError>;
}

/// Parse one `atq` line: `<id> <when...> <queue> <owner>`.
///
/// The descriptor has no fixed width, so it is taken positionally as
/// everything between the id and the last two tokens. Lines that do not fit
/// that shape return `None`.
pub fn parse_atq_line(line: &str) -> Option<QueueEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let owner = tokens[tokens.len() - 1];
    let queue_token = tokens[tokens.len() - 2];
    let mut queue_chars = queue_token.chars();
    let queue = match (queue_chars.next(), queue_chars.next()) {
        (Some(c), None) => c,
        _ => return None,
    };

    Some(QueueEntry {
        id: JobId(tokens[0].to_string()),
        schedule: tokens[1..tokens.len() - 2].join(" "),
        queue,
        owner: owner.to_string(),
    })
}

/// Parse full `atq` output, skipping (and logging) lines that don't parse.
pub fn parse_atq_listing(output: &str) -> Vec<QueueEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_atq_line(line);
            if entry.is_none() {
                warn!(line, "skipping unrecognized queue listing line");
            }
            entry
        })
        .collect()
}

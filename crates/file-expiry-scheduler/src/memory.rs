//! In-memory queue backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use tokio::sync::RwLock;

use crate::{JobId, QueueBackend, QueueEntry, QueueError};

/// `atq`'s timestamp layout.
const ATQ_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone)]
struct StoredJob {
    id: JobId,
    schedule: String,
    body: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    jobs: Vec<StoredJob>,
    vanish_on_inspect: HashSet<JobId>,
    vanish_on_remove: HashSet<JobId>,
    reject_inspect: HashMap<JobId, String>,
    reject_submits: Option<String>,
}

/// A [`QueueBackend`] held entirely in memory.
///
/// Follows the `at` contract: ids ascend from 1, listing is in submission
/// order, and missing jobs are [`QueueError::NotFound`]. Relative specs of
/// the form `now + N <unit>` are rendered as absolute `atq`-style times;
/// anything else is echoed back as the descriptor.
#[derive(Debug)]
pub struct MemoryQueue {
    owner: String,
    state: RwLock<State>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_owner("user")
    }

    /// Create a queue whose jobs are listed as owned by `owner`.
    pub fn with_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: RwLock::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    /// Make every following submit fail with `message`, or succeed again with `None`.
    pub async fn reject_submits(&self, message: Option<&str>) {
        self.state.write().await.reject_submits = message.map(str::to_string);
    }

    /// Make `id` disappear the next time it is inspected, as if it ran or was
    /// removed by someone else right after being listed.
    pub async fn vanish_on_inspect(&self, id: &JobId) {
        self.state.write().await.vanish_on_inspect.insert(id.clone());
    }

    /// Make `id` disappear just before it is removed, as if it ran between
    /// inspection and removal.
    pub async fn vanish_on_remove(&self, id: &JobId) {
        self.state.write().await.vanish_on_remove.insert(id.clone());
    }

    /// Make inspecting `id` fail with `message`, as `at -c` does for a job
    /// owned by another user.
    pub async fn reject_inspect(&self, id: &JobId, message: &str) {
        self.state
            .write()
            .await
            .reject_inspect
            .insert(id.clone(), message.to_string());
    }

    /// Drop a job as if the daemon had run it.
    pub async fn expire(&self, id: &JobId) -> bool {
        let mut state = self.state.write().await;
        let before = state.jobs.len();
        state.jobs.retain(|j| &j.id != id);
        state.jobs.len() != before
    }

    /// Submit a job under an explicit body, bypassing any rejection hook.
    pub async fn insert_raw(&self, body: &str, when: &str) -> JobId {
        let mut state = self.state.write().await;
        push_job(&mut state, body, when)
    }

    /// Number of queued jobs.
    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn push_job(state: &mut State, body: &str, when: &str) -> JobId {
    let id = JobId(state.next_id.to_string());
    state.next_id += 1;
    state.jobs.push(StoredJob {
        id: id.clone(),
        schedule: describe(when, Utc::now()),
        body: body.to_string(),
    });
    id
}

/// Render a time spec the way `atq` would list it.
fn describe(when: &str, now: DateTime<Utc>) -> String {
    relative_time(when, now)
        .map(|at| at.format(ATQ_TIME_FORMAT).to_string())
        .unwrap_or_else(|| when.trim().to_string())
}

/// Evaluate `now + N <unit>`; `None` for anything else.
fn relative_time(when: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tokens: Vec<&str> = when.split_whitespace().collect();
    let [first, "+", count, unit] = tokens.as_slice() else {
        return None;
    };
    if !first.eq_ignore_ascii_case("now") {
        return None;
    }

    let count: u32 = count.parse().ok()?;
    let n = i64::from(count);
    match unit.trim_end_matches('s') {
        "minute" => Some(now + Duration::minutes(n)),
        "hour" => Some(now + Duration::hours(n)),
        "day" => Some(now + Duration::days(n)),
        "week" => Some(now + Duration::weeks(n)),
        "month" => now.checked_add_months(Months::new(count)),
        "year" => now.checked_add_months(Months::new(count.checked_mul(12)?)),
        _ => None,
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn submit(&self, command: &str, when: &str) -> Result<JobId, QueueError> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.reject_submits {
            return Err(QueueError::Rejected(message.clone()));
        }
        if when.trim().is_empty() {
            return Err(QueueError::Rejected("Garbled time".to_string()));
        }
        Ok(push_job(&mut state, command, when))
    }

    async fn list_jobs(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .iter()
            .map(|job| QueueEntry {
                id: job.id.clone(),
                schedule: job.schedule.clone(),
                queue: 'a',
                owner: self.owner.clone(),
            })
            .collect())
    }

    async fn inspect_job(&self, id: &JobId) -> Result<String, QueueError> {
        let mut state = self.state.write().await;
        if let Some(message) = state.reject_inspect.get(id) {
            return Err(QueueError::Rejected(message.clone()));
        }
        if state.vanish_on_inspect.remove(id) {
            state.jobs.retain(|j| &j.id != id);
        }
        state
            .jobs
            .iter()
            .find(|j| &j.id == id)
            .map(|j| j.body.clone())
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    async fn remove_job(&self, id: &JobId) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        if state.vanish_on_remove.remove(id) {
            state.jobs.retain(|j| &j.id != id);
        }
        let before = state.jobs.len();
        state.jobs.retain(|j| &j.id != id);
        if state.jobs.len() == before {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

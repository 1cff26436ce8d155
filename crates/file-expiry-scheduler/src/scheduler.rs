//! Expiry scheduler implementation.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    ExpiryError, ExpiryRequest, FileIdentity, JobId, Marker, MarkerEncoder, QueueBackend,
    QueueEntry, QueueError,
};

/// A file's identity together with what the queue says about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryStatus {
    #[serde(flatten)]
    pub identity: FileIdentity,
    /// Descriptor of the first matching job, if any.
    pub scheduled_for: Option<String>,
}

/// Schedules, finds and cancels per-file expiry jobs on a queue.
///
/// Stateless between calls: every operation re-reads the file's identity and
/// the queue. Replacing an expiry is cancel-then-submit and is not atomic;
/// two concurrent callers for one file can leave zero or two jobs behind
/// (see [`ExpiryScheduler::deduplicate`]).
pub struct ExpiryScheduler<Q> {
    queue: Q,
    encoder: MarkerEncoder,
}

impl<Q: QueueBackend> ExpiryScheduler<Q> {
    /// Create a scheduler using the default helper command.
    pub fn new(queue: Q) -> Self {
        Self::with_encoder(queue, MarkerEncoder::default())
    }

    /// Create a scheduler with a custom encoder.
    pub fn with_encoder(queue: Q, encoder: MarkerEncoder) -> Self {
        Self { queue, encoder }
    }

    /// The underlying queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn encoder(&self) -> &MarkerEncoder {
        &self.encoder
    }

    /// Expire `path` at an `at` time spec, replacing any existing expiry.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn schedule_at(&self, path: &Path, when: &str) -> Result<JobId, ExpiryError> {
        let when = when.trim();
        if when.is_empty() {
            return Err(ExpiryError::InvalidInput("time string is empty".to_string()));
        }
        // at would read a leading dash as one of its own options
        if when.starts_with('-') {
            return Err(ExpiryError::InvalidInput(format!(
                "time string must not start with '-': {:?}",
                when
            )));
        }

        self.replace(path, when, None).await
    }

    /// Expire `path` after `minutes`, replacing any existing expiry.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn schedule_after(&self, path: &Path, minutes: u64) -> Result<JobId, ExpiryError> {
        if minutes == 0 {
            return Err(ExpiryError::InvalidInput(
                "expiry after must be a positive integer".to_string(),
            ));
        }

        let when = format!("now + {} minutes", minutes);
        self.replace(path, &when, Some(minutes)).await
    }

    /// Apply a validated request.
    pub async fn schedule(
        &self,
        path: &Path,
        request: &ExpiryRequest,
    ) -> Result<JobId, ExpiryError> {
        match request {
            ExpiryRequest::At(when) => self.schedule_at(path, when).await,
            ExpiryRequest::After(minutes) => self.schedule_after(path, *minutes).await,
        }
    }

    /// Remove every job that would expire `path` as it is now.
    ///
    /// Returns how many jobs were removed. Cancelling an unscheduled file is
    /// not an error.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn cancel(&self, path: &Path) -> Result<usize, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;
        self.cancel_identity(&identity).await
    }

    /// The schedule descriptor of the job that will expire `path`, if any.
    ///
    /// When duplicates exist, the first one in listing order is reported.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn query(&self, path: &Path) -> Result<Option<String>, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;
        self.first_match(&identity).await
    }

    /// Like [`query`](Self::query), but also returns the identity the lookup
    /// was keyed on.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn status(&self, path: &Path) -> Result<ExpiryStatus, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;
        let scheduled_for = self.first_match(&identity).await?;
        Ok(ExpiryStatus {
            identity,
            scheduled_for,
        })
    }

    /// All listed jobs that would expire `path` as it is now, in listing order.
    pub async fn find_jobs(&self, path: &Path) -> Result<Vec<QueueEntry>, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;
        self.matching_jobs(&identity).await
    }

    /// Keep only the last-submitted expiry job for `path`.
    ///
    /// Heals the duplicates a cancel/submit race can leave. Returns how many
    /// jobs were removed.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn deduplicate(&self, path: &Path) -> Result<usize, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;
        let mut matching = self.matching_jobs(&identity).await?;

        if matching.len() <= 1 {
            return Ok(0);
        }

        // Listing order is submission order; keep the newest
        matching.pop();

        let mut removed = 0;
        for entry in matching {
            if self.remove(&entry.id).await? {
                removed += 1;
                info!(id = %entry.id, "deleted duplicate expiry job");
            }
        }
        Ok(removed)
    }

    async fn replace(
        &self,
        path: &Path,
        when: &str,
        minutes: Option<u64>,
    ) -> Result<JobId, ExpiryError> {
        let identity = FileIdentity::resolve(path).await?;

        let cancelled = self.cancel_identity(&identity).await?;
        if cancelled > 0 {
            debug!(cancelled, "replacing existing expiry");
        }

        let command = self
            .encoder
            .build_schedule_command(&identity.path, identity.inode, minutes);

        // A failed submit leaves the file unscheduled; the cancel stands
        let id = self
            .queue
            .submit(&command, when)
            .await
            .map_err(|e| ExpiryError::Scheduling(e.to_string()))?;

        info!(id = %id, inode = identity.inode, when, "scheduled expiry");
        Ok(id)
    }

    async fn first_match(&self, identity: &FileIdentity) -> Result<Option<String>, ExpiryError> {
        let marker = self.encoder.marker_for(identity);

        for entry in self.queue.list_jobs().await? {
            if self.job_matches(&entry, &marker).await {
                return Ok(Some(entry.schedule));
            }
        }

        Ok(None)
    }

    async fn cancel_identity(&self, identity: &FileIdentity) -> Result<usize, ExpiryError> {
        let mut removed = 0;
        for entry in self.matching_jobs(identity).await? {
            if self.remove(&entry.id).await? {
                removed += 1;
                info!(id = %entry.id, "cancelled expiry job");
            }
        }
        Ok(removed)
    }

    async fn matching_jobs(&self, identity: &FileIdentity) -> Result<Vec<QueueEntry>, ExpiryError> {
        let marker = self.encoder.marker_for(identity);
        let mut matching = Vec::new();

        for entry in self.queue.list_jobs().await? {
            if self.job_matches(&entry, &marker).await {
                matching.push(entry);
            }
        }

        Ok(matching)
    }

    /// Inspect one job. A job that cannot be inspected, whether it vanished
    /// since listing or belongs to someone we may not read, is not a match.
    async fn job_matches(&self, entry: &QueueEntry, marker: &Marker) -> bool {
        match self.queue.inspect_job(&entry.id).await {
            Ok(body) => marker.is_in(&body),
            Err(QueueError::NotFound(_)) => {
                debug!(id = %entry.id, "job vanished before inspection");
                false
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "skipping job that could not be inspected");
                false
            }
        }
    }

    /// Remove one job. Returns false if it was already gone.
    async fn remove(&self, id: &JobId) -> Result<bool, ExpiryError> {
        match self.queue.remove_job(id).await {
            Ok(()) => Ok(true),
            Err(QueueError::NotFound(_)) => {
                warn!(id = %id, "job already gone");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryQueue;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
        scheduler: ExpiryScheduler<MemoryQueue>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        Fixture {
            _dir: dir,
            path,
            scheduler: ExpiryScheduler::with_encoder(
                MemoryQueue::new(),
                MarkerEncoder::new("/opt/expire.sh"),
            ),
        }
    }

    #[tokio::test]
    async fn query_unscheduled_is_none() {
        let f = fixture();
        assert_eq!(f.scheduler.query(&f.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn schedule_at_then_query() {
        let f = fixture();
        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();
        assert_eq!(
            f.scheduler.query(&f.path).await.unwrap().as_deref(),
            Some("14:00")
        );
    }

    #[tokio::test]
    async fn rescheduling_replaces() {
        let f = fixture();
        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();
        f.scheduler.schedule_after(&f.path, 30).await.unwrap();
        f.scheduler.schedule_at(&f.path, "16:00").await.unwrap();

        assert_eq!(f.scheduler.find_jobs(&f.path).await.unwrap().len(), 1);
        assert_eq!(f.scheduler.queue().len().await, 1);
        assert_eq!(
            f.scheduler.query(&f.path).await.unwrap().as_deref(),
            Some("16:00")
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let f = fixture();
        f.scheduler
            .queue()
            .insert_raw("echo unrelated", "14:00")
            .await;

        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 0);
        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 0);
        assert_eq!(f.scheduler.queue().len().await, 1);
    }

    #[tokio::test]
    async fn zero_minutes_rejected_before_queue_mutation() {
        let f = fixture();
        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();

        let err = f.scheduler.schedule_after(&f.path, 0).await.unwrap_err();
        assert!(matches!(err, ExpiryError::InvalidInput(_)));
        // The existing job survives
        assert!(f.scheduler.query(&f.path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_time_spec_rejected() {
        let f = fixture();
        let err = f.scheduler.schedule_at(&f.path, "   ").await.unwrap_err();
        assert!(matches!(err, ExpiryError::InvalidInput(_)));
        assert!(f.scheduler.queue().is_empty().await);
    }

    #[tokio::test]
    async fn failed_submit_keeps_cancellation() {
        let f = fixture();
        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();
        f.scheduler
            .queue()
            .reject_submits(Some("syntax error. Last token seen: o'clock"))
            .await;

        let err = f
            .scheduler
            .schedule_at(&f.path, "5 o'clock")
            .await
            .unwrap_err();
        match err {
            ExpiryError::Scheduling(msg) => assert!(msg.contains("Last token seen")),
            other => panic!("expected Scheduling, got {:?}", other),
        }
        assert_eq!(f.scheduler.query(&f.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn vanished_job_does_not_abort_cancel() {
        let f = fixture();
        let queue = f.scheduler.queue();
        let body = f.scheduler.encoder().build_schedule_command(
            &f.path,
            FileIdentity::resolve(&f.path).await.unwrap().inode,
            None,
        );
        let first = queue.insert_raw(&body, "14:00").await;
        queue.insert_raw(&body, "15:00").await;
        queue.vanish_on_inspect(&first).await;

        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn query_reports_first_duplicate_and_cancel_clears_all() {
        let f = fixture();
        let inode = FileIdentity::resolve(&f.path).await.unwrap().inode;
        let body = f
            .scheduler
            .encoder()
            .build_schedule_command(&f.path, inode, None);
        f.scheduler.queue().insert_raw(&body, "14:00").await;
        f.scheduler.queue().insert_raw(&body, "15:00").await;

        assert_eq!(
            f.scheduler.query(&f.path).await.unwrap().as_deref(),
            Some("14:00")
        );
        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 2);
        assert_eq!(f.scheduler.query(&f.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deduplicate_keeps_newest() {
        let f = fixture();
        let inode = FileIdentity::resolve(&f.path).await.unwrap().inode;
        let body = f
            .scheduler
            .encoder()
            .build_schedule_command(&f.path, inode, None);
        f.scheduler.queue().insert_raw(&body, "14:00").await;
        f.scheduler.queue().insert_raw(&body, "15:00").await;
        f.scheduler.queue().insert_raw(&body, "16:00").await;

        assert_eq!(f.scheduler.deduplicate(&f.path).await.unwrap(), 2);
        let remaining = f.scheduler.find_jobs(&f.path).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].schedule, "16:00");

        assert_eq!(f.scheduler.deduplicate(&f.path).await.unwrap(), 0);
    }

    async fn queue_duplicates(f: &Fixture, count: usize) -> Vec<JobId> {
        let inode = FileIdentity::resolve(&f.path).await.unwrap().inode;
        let body = f
            .scheduler
            .encoder()
            .build_schedule_command(&f.path, inode, None);
        let mut ids = Vec::new();
        for hour in 0..count {
            ids.push(
                f.scheduler
                    .queue()
                    .insert_raw(&body, &format!("{}:00", 14 + hour))
                    .await,
            );
        }
        ids
    }

    #[tokio::test]
    async fn job_gone_before_removal_does_not_abort_cancel() {
        let f = fixture();
        let ids = queue_duplicates(&f, 3).await;
        f.scheduler.queue().vanish_on_remove(&ids[0]).await;

        // The vanished job is not counted, the later duplicates still go
        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 2);
        assert!(f.scheduler.queue().is_empty().await);
    }

    #[tokio::test]
    async fn job_gone_before_removal_does_not_abort_deduplicate() {
        let f = fixture();
        let ids = queue_duplicates(&f, 3).await;
        f.scheduler.queue().vanish_on_remove(&ids[0]).await;

        assert_eq!(f.scheduler.deduplicate(&f.path).await.unwrap(), 1);
        let remaining = f.scheduler.find_jobs(&f.path).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[2]);
    }

    #[tokio::test]
    async fn uninspectable_job_is_skipped() {
        let f = fixture();
        let queue = f.scheduler.queue();
        let foreign = queue.insert_raw("/usr/bin/backup --all", "03:00").await;
        queue.reject_inspect(&foreign, "Not owner of job 1").await;

        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();
        assert_eq!(
            f.scheduler.query(&f.path).await.unwrap().as_deref(),
            Some("14:00")
        );
        assert_eq!(f.scheduler.cancel(&f.path).await.unwrap(), 1);
        assert_eq!(f.scheduler.query(&f.path).await.unwrap(), None);

        // The job we could not read is left alone
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.list_jobs().await.unwrap()[0].id, foreign);
    }

    #[tokio::test]
    async fn option_like_time_spec_rejected_before_queue_mutation() {
        let f = fixture();
        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();

        let err = f
            .scheduler
            .schedule_at(&f.path, "-f /etc/passwd now")
            .await
            .unwrap_err();
        assert!(matches!(err, ExpiryError::InvalidInput(_)), "{err:?}");
        assert_eq!(
            f.scheduler.query(&f.path).await.unwrap().as_deref(),
            Some("14:00")
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn non_utf8_path_rejected_before_queue_access() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let f = fixture();
        let path = f
            .path
            .with_file_name(OsStr::from_bytes(b"report\xff.txt"));
        std::fs::write(&path, b"data").unwrap();

        let err = f.scheduler.schedule_at(&path, "14:00").await.unwrap_err();
        assert!(matches!(err, ExpiryError::InvalidInput(_)), "{err:?}");
        assert!(f.scheduler.queue().is_empty().await);
    }

    #[tokio::test]
    async fn status_reports_identity_and_descriptor() {
        let f = fixture();
        let unscheduled = f.scheduler.status(&f.path).await.unwrap();
        assert_eq!(unscheduled.scheduled_for, None);

        f.scheduler.schedule_at(&f.path, "14:00").await.unwrap();
        let status = f.scheduler.status(&f.path).await.unwrap();
        assert_eq!(status.identity, FileIdentity::resolve(&f.path).await.unwrap());
        assert_eq!(status.scheduled_for.as_deref(), Some("14:00"));
    }

    #[tokio::test]
    async fn missing_path_fails_before_queue_access() {
        let f = fixture();
        let err = f
            .scheduler
            .schedule_at(&f.path.with_file_name("absent"), "14:00")
            .await
            .unwrap_err();
        assert!(matches!(err, ExpiryError::PathResolution { .. }));
        assert!(f.scheduler.queue().is_empty().await);
    }

    #[tokio::test]
    async fn request_dispatch() {
        let f = fixture();
        f.scheduler
            .schedule(&f.path, &ExpiryRequest::After(45))
            .await
            .unwrap();
        let body = f
            .scheduler
            .queue()
            .inspect_job(&JobId::from("1"))
            .await
            .unwrap();
        assert!(body.ends_with(" 45"));
    }
}

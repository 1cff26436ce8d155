//! `at(1)` queue backend.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::queue::parse_atq_listing;
use crate::{JobId, QueueBackend, QueueEntry, QueueError};

/// Executables used to talk to the at daemon.
#[derive(Debug, Clone)]
pub struct AtQueueConfig {
    /// Submits and dumps jobs (`at`, `at -c`).
    pub at: String,
    /// Lists jobs.
    pub atq: String,
    /// Removes jobs.
    pub atrm: String,
}

impl Default for AtQueueConfig {
    fn default() -> Self {
        Self {
            at: "at".to_string(),
            atq: "atq".to_string(),
            atrm: "atrm".to_string(),
        }
    }
}

/// Queue backend that shells out to `at`, `atq` and `atrm`.
#[derive(Debug, Clone, Default)]
pub struct AtQueue {
    config: AtQueueConfig,
}

impl AtQueue {
    /// Create a backend using the default executables from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with custom executables.
    pub fn with_config(config: AtQueueConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<Output, QueueError> {
        debug!(program, ?args, "running queue command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd
            .spawn()
            .map_err(|e| QueueError::Unavailable(format!("failed to run {}: {}", program, e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let line = format!("{}\n", input);
            match pipe.write_all(line.as_bytes()).await {
                Ok(()) => {}
                // at may bail out on a bad time spec before reading stdin;
                // its exit status reports that
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(program, "stdin closed early");
                }
                Err(e) => {
                    return Err(QueueError::Unavailable(format!("{} stdin: {}", program, e)));
                }
            }
            // Dropping the pipe closes it so at sees EOF
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| QueueError::Unavailable(format!("failed to wait for {}: {}", program, e)))
    }
}

/// Turn a failed command's stderr into a queue error.
fn failure(program: &str, id: Option<&JobId>, output: &Output) -> QueueError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if let Some(id) = id {
        if stderr.contains("Cannot find jobid") {
            return QueueError::NotFound(id.to_string());
        }
    }

    if stderr.is_empty() {
        QueueError::Rejected(format!("{} exited with {}", program, output.status))
    } else {
        QueueError::Rejected(stderr)
    }
}

/// Find the id in at's `job <N> at <time>` confirmation.
fn parse_submitted_job(stderr: &str) -> Option<JobId> {
    stderr.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("job"), Some(id)) => Some(JobId(id.to_string())),
            _ => None,
        }
    })
}

#[async_trait]
impl QueueBackend for AtQueue {
    async fn submit(&self, command: &str, when: &str) -> Result<JobId, QueueError> {
        // at takes the time spec as separate words, e.g. `now + 5 minutes`
        let args: Vec<&str> = when.split_whitespace().collect();
        if args.first().is_some_and(|word| word.starts_with('-')) {
            return Err(QueueError::Rejected(format!(
                "time spec must not start with '-': {}",
                when
            )));
        }
        let output = self.run(&self.config.at, &args, Some(command)).await?;
        if !output.status.success() {
            let err = failure(&self.config.at, None, &output);
            warn!(when, error = %err, "at rejected job");
            return Err(err);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_submitted_job(&stderr).ok_or_else(|| QueueError::Malformed(stderr.trim().to_string()))
    }

    async fn list_jobs(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let output = self.run(&self.config.atq, &[], None).await?;
        if !output.status.success() {
            return Err(failure(&self.config.atq, None, &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_atq_listing(&stdout))
    }

    async fn inspect_job(&self, id: &JobId) -> Result<String, QueueError> {
        let output = self.run(&self.config.at, &["-c", id.as_str()], None).await?;
        if !output.status.success() {
            return Err(failure(&self.config.at, Some(id), &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn remove_job(&self, id: &JobId) -> Result<(), QueueError> {
        let output = self.run(&self.config.atrm, &[id.as_str()], None).await?;
        if !output.status.success() {
            return Err(failure(&self.config.atrm, Some(id), &output));
        }

        Ok(())
    }
}

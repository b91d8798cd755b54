//! Client-side job tracking.
//!
//! Mirrors the dashboard's polling flow: a submission moves the tracker
//! from `idle` to `loading`, an accepted job id moves it to `queued`, and
//! polling then follows the job until it settles at `completed` or
//! `failed`. A failed poll request is ignored and retried on the next tick.

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use strum::{AsRefStr, Display as StrumDisplay};
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};

/// Delay between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, StrumDisplay, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackedStatus {
    #[default]
    Idle,
    Loading,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TrackedStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, TrackedStatus::Completed | TrackedStatus::Failed)
    }
}

impl From<JobStatus> for TrackedStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => TrackedStatus::Queued,
            JobStatus::Processing => TrackedStatus::Processing,
            JobStatus::Completed => TrackedStatus::Completed,
            JobStatus::Failed => TrackedStatus::Failed,
        }
    }
}

/// State of one submitted job as seen by a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTracker {
    status: TrackedStatus,
    job_id: Option<Uuid>,
    produced: Option<String>,
    error: Option<String>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TrackedStatus {
        self.status
    }

    pub fn job_id(&self) -> Option<Uuid> {
        self.job_id
    }

    /// Audio path, voice id or chunk count of a completed job.
    pub fn produced(&self) -> Option<&str> {
        self.produced.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }

    /// A submission request is in flight. Clears any previous job.
    pub fn begin_submission(&mut self) {
        *self = Self {
            status: TrackedStatus::Loading,
            ..Self::default()
        };
    }

    pub fn submission_accepted(&mut self, job_id: Uuid) {
        self.status = TrackedStatus::Queued;
        self.job_id = Some(job_id);
    }

    pub fn submission_rejected(&mut self, message: impl Into<String>) {
        self.status = TrackedStatus::Failed;
        self.error = Some(message.into());
    }

    /// Fold a polled job into the tracker. Returns whether the status changed.
    ///
    /// Snapshots of other jobs and anything after settling are ignored.
    pub fn observe(&mut self, job: &Job) -> bool {
        if self.job_id != Some(job.id) || self.is_settled() {
            return false;
        }

        let next = TrackedStatus::from(job.status);
        match next {
            TrackedStatus::Completed => {
                self.produced = job
                    .output()
                    .ok()
                    .and_then(|output| output.produced(job.job_type));
            }
            TrackedStatus::Failed => {
                self.error = Some(job.error.clone().unwrap_or_else(|| "Job failed".to_string()));
            }
            _ => {}
        }

        let changed = next != self.status;
        self.status = next;
        changed
    }
}

/// Poll `fetch` every `interval` until the tracked job settles.
///
/// `on_update` runs after every status change. Returns immediately when no
/// job has been accepted.
pub async fn poll_until_settled<F, Fut, E>(
    tracker: &mut JobTracker,
    interval: Duration,
    mut fetch: F,
    mut on_update: impl FnMut(&JobTracker),
) -> TrackedStatus
where
    F: FnMut(Uuid) -> Fut,
    Fut: Future<Output = Result<Job, E>>,
    E: Display,
{
    let Some(job_id) = tracker.job_id() else {
        return tracker.status();
    };

    while !tracker.is_settled() {
        tokio::time::sleep(interval).await;
        match fetch(job_id).await {
            Ok(job) => {
                if tracker.observe(&job) {
                    on_update(tracker);
                }
            }
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Status poll failed"),
        }
    }

    tracker.status()
}

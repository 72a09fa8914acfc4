//! Job table, progress logs and cancellation handlers.
//!
//! A job is created synchronously by [`JobRegistry::submit`] in the
//! `pending` state. Its task body runs on a spawned driver task, so the
//! caller always holds the job id (and can reach [`JobRegistry::cancel`])
//! before any work starts. The driver marks the job `running`, drains
//! progress events from the task into the log and records the terminal
//! outcome exactly once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use lightbake_core::error::CoreError;
use lightbake_core::job::{JobSnapshot, JobStatus, JobView, CANCELLED_MESSAGE};
use lightbake_core::progress::ProgressEvent;
use lightbake_core::types::{new_job_id, JobId, Timestamp};
use tokio::sync::mpsc;

/// Outcome of a task body: a result payload or a human-readable error.
pub type TaskResult = Result<serde_json::Value, String>;

type CancelHandler = Box<dyn FnOnce() + Send>;

struct JobEntry {
    status: JobStatus,
    progress: Vec<ProgressEvent>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl JobEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            status: JobStatus::Pending,
            progress: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            status: self.status,
            progress_len: self.progress.len(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    cancel_handlers: Mutex<HashMap<JobId, CancelHandler>>,
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<JobId, CancelHandler>> {
        self.cancel_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_running(&self, id: JobId) {
        if let Some(job) = self.jobs().get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                job.updated_at = Utc::now();
            }
        }
        tracing::debug!(job_id = %id, "Job started");
    }

    fn append(&self, id: JobId, event: ProgressEvent) {
        if let Some(job) = self.jobs().get_mut(&id) {
            if !job.status.is_terminal() {
                job.progress.push(event);
                job.updated_at = Utc::now();
            }
        }
    }

    fn finish(&self, id: JobId, outcome: TaskResult) {
        // A finished job can no longer be cancelled.
        self.handlers().remove(&id);

        let mut jobs = self.jobs();
        let Some(job) = jobs.get_mut(&id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        job.updated_at = Utc::now();
        match outcome {
            Ok(result) => {
                job.status = JobStatus::Done;
                job.result = Some(result);
                tracing::info!(job_id = %id, events = job.progress.len(), "Job done");
            }
            Err(error) => {
                if error == CANCELLED_MESSAGE {
                    tracing::info!(job_id = %id, "Job cancelled");
                } else {
                    tracing::warn!(job_id = %id, error = %error, "Job failed");
                }
                job.status = JobStatus::Error;
                job.error = Some(error);
            }
        }
    }
}

/// Handle given to a task body for reporting progress.
///
/// Events are delivered through an unbounded channel and appended to the
/// job's log in send order.
#[derive(Clone)]
pub struct JobContext {
    id: JobId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl JobContext {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Append one event to the job's progress log.
    ///
    /// Events sent after the job reached a terminal state are dropped.
    pub fn progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// In-memory table of jobs plus their cancellation handlers.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and schedule `task` on the tokio runtime.
    ///
    /// Returns as soon as the job exists in the `pending` state; `task` is
    /// never polled inside this call. `on_cancel` is invoked at most once,
    /// by the first successful [`cancel`](Self::cancel), and is discarded
    /// when the job reaches a terminal state.
    ///
    /// A task that never completes leaves its job `running` forever; no
    /// timeout is applied here. A task that panics fails its job.
    pub fn submit<F, Fut, C>(&self, task: F, on_cancel: C) -> JobId
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let id = new_job_id();
        self.inner.jobs().insert(id, JobEntry::new());
        self.inner.handlers().insert(id, Box::new(on_cancel));
        tracing::debug!(job_id = %id, "Job submitted");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(drive(inner, id, task));
        id
    }

    /// Status of a job plus every progress event from `offset` onwards.
    ///
    /// An offset past the end of the log yields an empty batch.
    pub fn get(&self, id: JobId, offset: usize) -> Result<JobView, CoreError> {
        let jobs = self.inner.jobs();
        let job = jobs.get(&id).ok_or_else(|| CoreError::job_not_found(id))?;
        let start = offset.min(job.progress.len());
        Ok(JobView {
            status: job.status,
            progress: job.progress[start..].to_vec(),
            result: job.result.clone(),
            error: job.error.clone(),
        })
    }

    /// Invoke and remove the job's cancellation handler.
    ///
    /// Fails with NotFound when the job is unknown, already finished or
    /// already cancelled. The returned snapshot is taken after the handler
    /// ran; the job itself reaches its terminal state once the task body
    /// observes the cancellation.
    pub fn cancel(&self, id: JobId) -> Result<JobSnapshot, CoreError> {
        let handler = self
            .inner
            .handlers()
            .remove(&id)
            .ok_or_else(|| CoreError::job_not_found(id))?;

        tracing::info!(job_id = %id, "Cancelling job");
        handler();
        self.snapshot(id)
    }

    pub fn snapshot(&self, id: JobId) -> Result<JobSnapshot, CoreError> {
        self.inner
            .jobs()
            .get(&id)
            .map(|job| job.snapshot(id))
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Number of jobs known to the registry.
    pub fn len(&self) -> usize {
        self.inner.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn drive<F, Fut>(inner: Arc<Inner>, id: JobId, task: F)
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    inner.mark_running(id);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handle = tokio::spawn(task(JobContext { id, tx }));

    let outcome = loop {
        tokio::select! {
            biased;
            Some(event) = rx.recv() => inner.append(id, event),
            joined = &mut handle => {
                break joined.unwrap_or_else(|e| Err(format!("Job task panicked: {e}")));
            }
        }
    };

    // Everything sent before the task returned lands before the outcome.
    while let Ok(event) = rx.try_recv() {
        inner.append(id, event);
    }
    inner.finish(id, outcome);
}

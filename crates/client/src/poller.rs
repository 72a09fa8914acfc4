//! Drive one job from upload to terminal state.
//!
//! The poller submits the payload, then polls with an offset cursor so
//! every progress event is seen exactly once, folding the events into
//! stages on the caller's [`ProgressSink`]. Cancellation is checked before
//! every fetch and while sleeping between fetches.

use std::time::Duration;

use lightbake_core::bake::BakeRequest;
use lightbake_core::folding::{StageFolder, ERROR_STAGE};
use lightbake_core::job::{JobStatus, CANCELLED_MESSAGE};
use lightbake_core::progress::ProgressSink;
use lightbake_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::service::JobService;

/// Delay between two polls of the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Name of the stage opened while the payload is uploaded.
pub const UPLOAD_STAGE: &str = "Uploading";

/// Submits a job and follows it until it finishes.
pub struct JobPoller<S> {
    service: S,
    poll_interval: Duration,
}

impl<S: JobService> JobPoller<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Upload `payload`, then poll the job until it is done.
    ///
    /// Returns the job result on success. A failed job yields
    /// [`ClientError::JobFailed`] naming the last stage seen; a job that
    /// ended with the cancellation message, or a run cancelled through
    /// `cancel`, yields [`ClientError::Cancelled`]. Transport errors end
    /// the run as they happen.
    pub async fn run(
        &self,
        request: &BakeRequest,
        payload: Vec<u8>,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ClientError> {
        let mut folder = StageFolder::new(sink);

        folder.open(UPLOAD_STAGE, None);
        let job_id = match self.service.submit(request, payload).await {
            Ok(id) => id,
            Err(e) => {
                folder.fail();
                return Err(e);
            }
        };
        folder.finish();
        tracing::info!(job_id = %job_id, name = %request.name, "Job submitted");

        let mut offset = 0usize;
        loop {
            if cancel.is_cancelled() {
                self.cancel_remote(job_id).await;
                folder.fail();
                return Err(ClientError::Cancelled);
            }

            let view = match self.service.poll(job_id, offset).await {
                Ok(view) => view,
                Err(e) => {
                    folder.fail();
                    return Err(e);
                }
            };

            for event in &view.progress {
                folder.feed(event);
            }
            offset += view.progress.len();

            match view.status {
                JobStatus::Done => {
                    folder.finish();
                    tracing::info!(job_id = %job_id, events = offset, "Job done");
                    return Ok(view.result.unwrap_or_default());
                }
                JobStatus::Error => {
                    let stage = folder.current_stage().unwrap_or(ERROR_STAGE).to_string();
                    folder.fail();
                    let message = view.error.unwrap_or_default();
                    if message == CANCELLED_MESSAGE {
                        tracing::info!(job_id = %job_id, "Job cancelled");
                        return Err(ClientError::Cancelled);
                    }
                    tracing::error!(job_id = %job_id, stage = %stage, error = %message, "Job failed");
                    return Err(ClientError::JobFailed { stage, message });
                }
                JobStatus::Pending | JobStatus::Running => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Best-effort server-side cancellation.
    async fn cancel_remote(&self, job_id: JobId) {
        match self.service.cancel(job_id).await {
            Ok(_) => tracing::info!(job_id = %job_id, "Job cancelled"),
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Failed to cancel job"),
        }
    }
}

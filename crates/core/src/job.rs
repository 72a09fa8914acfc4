//! Job lifecycle types exchanged between the registry, the HTTP layer and
//! the polling client.

use serde::{Deserialize, Serialize};

use crate::progress::ProgressEvent;
use crate::types::{JobId, Timestamp};

/// Error message used for every user-requested cancellation.
///
/// Callers compare against this exact string to tell a cancelled run apart
/// from a genuine failure.
pub const CANCELLED_MESSAGE: &str = "Cancelled";

/// Lifecycle state of a job.
///
/// Transitions only move forward: `pending -> running -> done | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// Response to a poll: the status plus every progress event from the
/// requested offset onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub status: JobStatus,
    pub progress: Vec<ProgressEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobView {
    /// True when the job ended with the distinguished cancellation error.
    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Error && self.error.as_deref() == Some(CANCELLED_MESSAGE)
    }
}

/// Point-in-time summary of a job, returned by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    /// Number of progress events recorded so far.
    pub progress_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Response to a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
}

//! Message protocol between a caller and an atlas worker.
//!
//! The caller posts exactly one [`WorkerRequest::Start`] and then receives
//! any number of [`WorkerMessage::Progress`] followed by one terminal
//! `Done` or `Error`. There is no cancel message: a caller that no longer
//! wants the result tears the worker down.

use serde::{Deserialize, Serialize};

use crate::atlas::AtlasParams;
use crate::geometry::MeshBuffers;

/// Caller to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Start {
        inputs: Vec<MeshBuffers>,
        params: AtlasParams,
    },
}

/// Worker to caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// `progress` is the completed fraction of `stage`, in `[0, 1]`.
    Progress { stage: String, progress: f64 },
    /// Transformed meshes, positionally aligned with the inputs.
    Done { result: Vec<MeshBuffers> },
    Error { error: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

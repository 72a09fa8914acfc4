/// Failures of the atlas transform itself, raised on the worker thread.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("Invalid atlas parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid geometry in mesh {mesh}: {reason}")]
    InvalidGeometry { mesh: usize, reason: String },

    #[error("Could not pack {charts} charts into a {resolution}x{resolution} atlas")]
    PackingFailed { charts: usize, resolution: u32 },

    /// The caller stopped listening; no result is wanted any more.
    #[error("Atlas generation aborted")]
    Aborted,
}

impl AtlasError {
    pub(crate) fn invalid(mesh: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            mesh,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced to the caller of the worker compute stage.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Cancelled")]
    Cancelled,

    /// The worker answered with an `error` message.
    #[error("Atlas worker failed: {0}")]
    Failed(String),

    /// The worker went away without a terminal message.
    #[error("Atlas worker disconnected")]
    Disconnected,

    #[error("Failed to start atlas worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker returned buffers that do not line up with the originals.
    #[error("Result shape mismatch for mesh {mesh}: {detail}")]
    ShapeMismatch { mesh: usize, detail: String },
}

impl WorkerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancelled_is_cancelled() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(!WorkerError::Failed("Cancelled".into()).is_cancelled());
        assert!(!WorkerError::Disconnected.is_cancelled());
    }

    #[test]
    fn messages_name_the_mesh() {
        let err = AtlasError::invalid(1, "index 9 out of range");
        assert_eq!(err.to_string(), "Invalid geometry in mesh 1: index 9 out of range");
    }
}

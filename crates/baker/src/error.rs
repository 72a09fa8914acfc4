use lightbake_core::error::CoreError;

/// Errors raised while preparing or running a bake.
#[derive(Debug, thiserror::Error)]
pub enum BakerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cancellation was requested before the process could be started.
    #[error("Cancelled")]
    Cancelled,
}

impl BakerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors surfaced by a client-side run.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The run was cancelled, locally or on the server.
    #[error("Cancelled")]
    Cancelled,

    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status code.
    #[error("Server error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The job ended in the `error` state.
    #[error("Job failed during {stage}: {message}")]
    JobFailed {
        /// Last stage seen before the failure.
        stage: String,
        message: String,
    },
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

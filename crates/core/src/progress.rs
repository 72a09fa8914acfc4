//! Progress vocabulary shared by the subprocess pipeline and the worker
//! pipeline.
//!
//! Both producers emit [`ProgressEvent`]s; consumers drive a
//! [`ProgressSink`] that hands out one [`ProgressHandler`] per stage.

use serde::{Deserialize, Serialize};

/// One raw telemetry record appended while a job executes.
///
/// The log is a plain time series: a stage transition is detected by a
/// change in `stage` between consecutive events, never by an explicit
/// marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Short label of the phase currently executing.
    pub stage: String,
    /// Completion fraction, nominally in `[0, 1]`. Not guaranteed monotonic.
    pub value: f64,
    /// Optional free-text annotation such as the current sub-item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, value: f64) -> Self {
        Self {
            stage: stage.into(),
            value,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Handle for one in-flight stage.
///
/// Calls after `done` or `cancel` are ignored by implementations.
pub trait ProgressHandler: Send {
    /// Report fractional completion of the stage.
    fn progress(&mut self, value: f64, details: Option<&str>);
    /// Close the stage successfully.
    fn done(&mut self);
    /// Close the stage as cancelled or failed.
    fn cancel(&mut self);
}

/// Factory of per-stage handles.
pub trait ProgressSink: Send + Sync {
    /// Open a new stage named `name`.
    fn start(&self, name: &str, details: Option<&str>) -> Box<dyn ProgressHandler>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

struct NoopHandler;

impl ProgressHandler for NoopHandler {
    fn progress(&mut self, _value: f64, _details: Option<&str>) {}
    fn done(&mut self) {}
    fn cancel(&mut self) {}
}

impl ProgressSink for NoopSink {
    fn start(&self, _name: &str, _details: Option<&str>) -> Box<dyn ProgressHandler> {
        Box::new(NoopHandler)
    }
}

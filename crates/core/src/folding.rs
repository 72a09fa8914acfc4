//! Stage folding: turning a flat stream of progress events into opened and
//! closed stages on a [`ProgressSink`].
//!
//! [`StageFolder`] is a two-state machine. With no active stage, any event
//! opens one. With an active stage, an event for the same stage updates it
//! and an event for a different stage closes it and opens the next.

use crate::progress::{ProgressEvent, ProgressHandler, ProgressSink};

/// Name of the stage opened by [`StageFolder::fail`] when a run fails
/// before any stage was reported.
pub const ERROR_STAGE: &str = "Error";

enum FoldState {
    NoActiveStage,
    ActiveStage {
        name: String,
        handler: Box<dyn ProgressHandler>,
    },
}

/// Folds progress events into stages on a borrowed sink.
pub struct StageFolder<'a> {
    sink: &'a dyn ProgressSink,
    state: FoldState,
}

impl<'a> StageFolder<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            state: FoldState::NoActiveStage,
        }
    }

    /// Open `name` as the active stage, closing whatever was active before.
    pub fn open(&mut self, name: &str, details: Option<&str>) {
        self.finish();
        self.state = FoldState::ActiveStage {
            name: name.to_string(),
            handler: self.sink.start(name, details),
        };
    }

    /// Fold one polled event.
    ///
    /// A stage change opens the new stage with the event's details; the
    /// event's value is not applied. An event for the active stage is
    /// forwarded as a progress update.
    pub fn feed(&mut self, event: &ProgressEvent) {
        if self.current_stage() != Some(event.stage.as_str()) {
            self.open(&event.stage, event.details.as_deref());
        } else if let FoldState::ActiveStage { handler, .. } = &mut self.state {
            handler.progress(event.value, event.details.as_deref());
        }
    }

    /// Fold one worker progress message: open the stage if it changed,
    /// then always apply the value.
    pub fn advance(&mut self, stage: &str, value: f64) {
        if self.current_stage() != Some(stage) {
            self.open(stage, None);
        }
        if let FoldState::ActiveStage { handler, .. } = &mut self.state {
            handler.progress(value, None);
        }
    }

    /// Close the active stage successfully.
    pub fn finish(&mut self) {
        if let FoldState::ActiveStage { mut handler, .. } =
            std::mem::replace(&mut self.state, FoldState::NoActiveStage)
        {
            handler.done();
        }
    }

    /// Close the active stage as cancelled or failed.
    ///
    /// With no active stage, an [`ERROR_STAGE`] is opened and cancelled so
    /// the failure is still visible on the sink.
    pub fn fail(&mut self) {
        match std::mem::replace(&mut self.state, FoldState::NoActiveStage) {
            FoldState::ActiveStage { mut handler, .. } => handler.cancel(),
            FoldState::NoActiveStage => self.sink.start(ERROR_STAGE, None).cancel(),
        }
    }

    pub fn current_stage(&self) -> Option<&str> {
        match &self.state {
            FoldState::ActiveStage { name, .. } => Some(name),
            FoldState::NoActiveStage => None,
        }
    }
}

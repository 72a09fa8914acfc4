//! Client-side stage timeline.
//!
//! [`StageTimeline`] is a [`ProgressSink`] that keeps one [`StageRecord`]
//! per opened stage, including its duration once closed and an ETA while
//! it is in flight.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::progress::{ProgressHandler, ProgressSink};

/// Aggregate view of one stage, rebuilt from progress events.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub name: String,
    /// Last reported completion fraction, clamped to `[0, 1]`.
    pub progress: f64,
    pub cancelled: bool,
    /// Wall time from open to close. `None` while the stage is in flight.
    pub duration: Option<Duration>,
    /// Annotations in the order they were reported.
    pub details: Vec<String>,
    /// Estimated time remaining. Only set while in flight with progress > 0.
    pub eta: Option<Duration>,
}

impl StageRecord {
    fn open(name: &str, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            progress: 0.0,
            cancelled: false,
            duration: None,
            details: details.map(str::to_string).into_iter().collect(),
            eta: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.duration.is_some()
    }
}

/// Estimate the remaining time of a stage from its elapsed time and
/// completion fraction: `elapsed * (1 - progress) / progress`.
///
/// Returns `None` when no progress has been made yet or the estimate does
/// not fit in a [`Duration`].
pub fn estimate_eta(elapsed: Duration, progress: f64) -> Option<Duration> {
    if progress.is_nan() || progress <= 0.0 {
        return None;
    }
    let progress = progress.min(1.0);
    let remaining = elapsed.as_secs_f64() * (1.0 - progress) / progress;
    Duration::try_from_secs_f64(remaining).ok()
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Thread-safe, cheaply cloneable record of every stage opened on it.
#[derive(Debug, Clone, Default)]
pub struct StageTimeline {
    records: Arc<Mutex<Vec<StageRecord>>>,
}

impl StageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all stage records, oldest first.
    pub fn records(&self) -> Vec<StageRecord> {
        self.lock().clone()
    }

    /// Name of the most recently opened stage.
    pub fn current_stage(&self) -> Option<String> {
        self.lock().last().map(|r| r.name.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for StageTimeline {
    fn start(&self, name: &str, details: Option<&str>) -> Box<dyn ProgressHandler> {
        let index = {
            let mut records = self.lock();
            records.push(StageRecord::open(name, details));
            records.len() - 1
        };
        Box::new(TimelineStage {
            records: Arc::clone(&self.records),
            index,
            started: Instant::now(),
            closed: false,
        })
    }
}

/// Handle bound to one record of a [`StageTimeline`].
struct TimelineStage {
    records: Arc<Mutex<Vec<StageRecord>>>,
    index: usize,
    started: Instant,
    closed: bool,
}

impl TimelineStage {
    fn update(&mut self, f: impl FnOnce(&mut StageRecord, Duration)) {
        if self.closed {
            return;
        }
        let elapsed = self.started.elapsed();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(self.index) {
            f(record, elapsed);
        }
    }
}

impl ProgressHandler for TimelineStage {
    fn progress(&mut self, value: f64, details: Option<&str>) {
        self.update(|record, elapsed| {
            record.progress = clamp_fraction(value);
            if let Some(details) = details {
                record.details.push(details.to_string());
            }
            record.eta = estimate_eta(elapsed, record.progress);
        });
    }

    fn done(&mut self) {
        self.update(|record, elapsed| {
            record.progress = 1.0;
            record.duration = Some(elapsed);
            record.eta = None;
        });
        self.closed = true;
    }

    fn cancel(&mut self) {
        self.update(|record, elapsed| {
            record.cancelled = true;
            record.duration = Some(elapsed);
            record.eta = None;
        });
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_requires_progress() {
        assert_eq!(estimate_eta(Duration::from_secs(10), 0.0), None);
        assert_eq!(estimate_eta(Duration::from_secs(10), f64::NAN), None);
    }

    #[test]
    fn eta_scales_with_remaining_fraction() {
        let eta = estimate_eta(Duration::from_secs(10), 0.25).unwrap();
        assert_eq!(eta, Duration::from_secs(30));

        let eta = estimate_eta(Duration::from_secs(8), 1.0).unwrap();
        assert_eq!(eta, Duration::ZERO);
    }

    #[test]
    fn start_opens_record_with_initial_details() {
        let timeline = StageTimeline::new();
        let _stage = timeline.start("Baking", Some("Rock_01"));

        let records = timeline.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Baking");
        assert_eq!(records[0].progress, 0.0);
        assert_eq!(records[0].details, vec!["Rock_01"]);
        assert!(!records[0].is_closed());
        assert_eq!(timeline.current_stage().as_deref(), Some("Baking"));
    }

    #[test]
    fn progress_updates_value_details_and_eta() {
        let timeline = StageTimeline::new();
        let mut stage = timeline.start("Baking", None);
        stage.progress(0.5, Some("Tree_02"));
        stage.progress(1.7, None);

        let record = &timeline.records()[0];
        assert_eq!(record.progress, 1.0);
        assert_eq!(record.details, vec!["Tree_02"]);
        assert!(record.eta.is_some());
        assert!(record.duration.is_none());
    }

    #[test]
    fn done_stamps_duration_and_completes() {
        let timeline = StageTimeline::new();
        let mut stage = timeline.start("Exporting model", None);
        stage.progress(0.3, None);
        stage.done();

        let record = &timeline.records()[0];
        assert_eq!(record.progress, 1.0);
        assert!(record.duration.is_some());
        assert!(record.eta.is_none());
        assert!(!record.cancelled);
    }

    #[test]
    fn cancel_marks_record_and_ignores_later_calls() {
        let timeline = StageTimeline::new();
        let mut stage = timeline.start("Denoising", None);
        stage.progress(0.4, None);
        stage.cancel();
        stage.progress(0.9, Some("late"));
        stage.done();

        let record = &timeline.records()[0];
        assert!(record.cancelled);
        assert_eq!(record.progress, 0.4);
        assert!(record.details.is_empty());
        assert!(record.eta.is_none());
    }

    #[test]
    fn clones_share_records() {
        let timeline = StageTimeline::new();
        let view = timeline.clone();
        let mut stage = timeline.start("Uploading", None);
        stage.done();
        assert_eq!(view.records().len(), 1);
    }
}

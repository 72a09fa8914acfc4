//! In-memory job registry.
//!
//! [`JobRegistry`] schedules deferred execution of long-running tasks,
//! keeps an append-only progress log per job and exposes single-shot
//! cancellation. State lives for the lifetime of the process.

pub mod registry;

pub use registry::{JobContext, JobRegistry};

//! Client side of the bake pipeline.
//!
//! [`JobService`] abstracts the submit / poll / cancel endpoints;
//! [`HttpJobService`] talks to a lightbake server over HTTP. [`JobPoller`]
//! drives one job from upload to terminal state and rebuilds its stage
//! timeline on a [`ProgressSink`](lightbake_core::progress::ProgressSink).

pub mod error;
pub mod poller;
pub mod service;

pub use error::ClientError;
pub use poller::JobPoller;
pub use service::{HttpJobService, JobService};

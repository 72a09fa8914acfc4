//! Worker-isolated compute stage: lightmap UV atlas generation.
//!
//! [`build_atlas`] hands a copy of the caller's meshes to an
//! [`AtlasWorker`] thread, folds its progress messages into stages on a
//! [`ProgressSink`](lightbake_core::progress::ProgressSink) and copies the
//! transformed buffers back once the worker is done.

pub mod atlas;
pub mod error;
pub mod geometry;
pub mod messages;
pub mod worker;

pub use atlas::{AtlasParams, AtlasStage};
pub use error::{AtlasError, WorkerError};
pub use geometry::{Attribute, BufferData, MeshBuffers};
pub use messages::{WorkerMessage, WorkerRequest};
pub use worker::{build_atlas, copy_back, AtlasWorker};

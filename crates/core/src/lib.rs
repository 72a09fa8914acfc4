//! Domain types shared by every lightbake crate.
//!
//! Holds the job and progress vocabulary used on both sides of the wire,
//! the stage timeline that turns raw progress events into human-facing
//! stage records, and the bake parameter set with its validation rules.
//! Nothing in here performs I/O.

pub mod bake;
pub mod error;
pub mod folding;
pub mod job;
pub mod progress;
pub mod timeline;
pub mod types;

//! External process executor for lightmap bakes.
//!
//! Builds the baking tool's command line, runs it as a child process,
//! bridges its `[PROGRESS]:` / `[INFO]:` stdout protocol into a registry
//! job and maps the exit status into the job outcome.

pub mod command;
pub mod config;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod runner;
pub mod service;

pub use config::BakerConfig;
pub use error::BakerError;
pub use lightbake_core::bake::BakeRequest;
pub use service::Baker;

pub mod bake;
pub mod jobs;

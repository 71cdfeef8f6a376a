//! Concurrency utilities shared by the pipelines.

pub mod deadline;
pub mod signal;

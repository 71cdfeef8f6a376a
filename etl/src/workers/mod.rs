//! Error classification and concurrent execution of entity pipelines.

pub mod parallel;
pub mod policy;

pub use parallel::{EntityOutcome, FatalFailure, ParallelPipeline, ParallelSyncReport};

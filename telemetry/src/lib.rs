//! Logging setup shared by the sync binaries and tests.

pub mod tracing;

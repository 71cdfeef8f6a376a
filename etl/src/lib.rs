//! Catalog sync core.
//!
//! Extracts product, pricing and inventory data from legacy sources (an ERP reached through a
//! SQL bridge, a desktop database reached through ODBC, and flat files), maps and validates it
//! against the field definition registry and upserts it idempotently into the catalog store.
//!
//! A [`pipeline::Pipeline`] syncs one entity in chunks; a [`workers::ParallelPipeline`] runs
//! several of them concurrently with isolated failures.

pub mod concurrency;
pub mod connectors;
pub mod error;
pub mod importer;
mod macros;
pub mod migrations;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;

//! Idempotent loading of canonical records into the catalog store.

pub mod base;
pub mod upsert;

pub use base::Importer;
pub use upsert::UpsertImporter;

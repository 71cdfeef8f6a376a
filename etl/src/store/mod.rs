//! Persistence contracts of the importer and their implementations.

pub mod both;
pub mod catalog;
pub mod history;

pub use both::memory::MemoryStore;
pub use both::postgres::PostgresStore;
pub use catalog::{CatalogStore, EntityKey};
pub use history::SyncHistoryStore;

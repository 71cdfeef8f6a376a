//! Row-to-record mapping and validation.

pub mod base;
pub mod catalog;

pub use base::{Processor, ValidationOutcome};
pub use catalog::CatalogProcessor;

//! Data flowing through a pipeline run: raw rows, canonical records and run results.

mod row;
mod sync;

pub use row::{Record, RecordRef, Row};
pub use sync::{RecordError, SyncResult};

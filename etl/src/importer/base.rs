use std::future::Future;

use crate::types::{Record, SyncResult};

/// Loads validated records of one entity into a target store.
///
/// Failures of single records are reported in the returned [`SyncResult`] and never abort the
/// batch, so `import_data` has no error path of its own.
pub trait Importer: Send + Sync {
    /// Creates or updates `records`, matching them with stored entities by their unique fields.
    ///
    /// With `dry_run` set, existing entities are still looked up and every change is counted,
    /// but nothing is written.
    fn import_data(
        &self,
        entity: &str,
        records: Vec<Record>,
        dry_run: bool,
    ) -> impl Future<Output = SyncResult> + Send;

    /// Persists the outcome of a run. Best effort: failures are logged, never returned.
    fn track_sync(&self, entity: &str, result: &SyncResult) -> impl Future<Output = ()> + Send;
}

use std::future::Future;

use crate::error::EtlResult;
use crate::types::SyncResult;

/// Persistence of per-run sync outcomes.
pub trait SyncHistoryStore: Send + Sync {
    /// Records the outcome of one run of `entity`.
    fn track_sync(
        &self,
        entity: &str,
        result: &SyncResult,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}

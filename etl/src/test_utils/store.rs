use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::store::{CatalogStore, EntityKey, MemoryStore, SyncHistoryStore};
use crate::types::{Record, SyncResult};

#[derive(Debug, Default)]
struct Faults {
    lookups: AtomicBool,
    writes: AtomicBool,
    history: AtomicBool,
}

/// [`MemoryStore`] wrapper whose lookups, writes or history tracking can be switched to fail.
///
/// Faults are shared between clones and can be toggled while a pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.faults.lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.faults.writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_history(&self, fail: bool) {
        self.faults.history.store(fail, Ordering::SeqCst);
    }
}

impl CatalogStore for FaultyStore {
    async fn get_existing_entities(
        &self,
        entity: &str,
        key_fields: &[String],
        keys: &[EntityKey],
    ) -> EtlResult<HashMap<EntityKey, Record>> {
        if self.faults.lookups.load(Ordering::SeqCst) {
            bail!(ErrorKind::PersistenceError, "Injected lookup failure", entity);
        }

        self.inner.get_existing_entities(entity, key_fields, keys).await
    }

    async fn create(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        if self.faults.writes.load(Ordering::SeqCst) {
            bail!(ErrorKind::PersistenceError, "Injected write failure", key);
        }

        self.inner.create(entity, key, record).await
    }

    async fn update(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        if self.faults.writes.load(Ordering::SeqCst) {
            bail!(ErrorKind::PersistenceError, "Injected write failure", key);
        }

        self.inner.update(entity, key, record).await
    }
}

impl SyncHistoryStore for FaultyStore {
    async fn track_sync(&self, entity: &str, result: &SyncResult) -> EtlResult<()> {
        if self.faults.history.load(Ordering::SeqCst) {
            bail!(ErrorKind::PersistenceError, "Injected history failure", entity);
        }

        self.inner.track_sync(entity, result).await
    }
}

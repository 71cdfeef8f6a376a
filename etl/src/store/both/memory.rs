use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::store::catalog::{CatalogStore, EntityKey};
use crate::store::history::SyncHistoryStore;
use crate::types::{Record, SyncResult};

/// Inner state of [`MemoryStore`].
#[derive(Debug, Default)]
struct Inner {
    /// Stored records per entity, keyed by their unique-field values.
    entities: HashMap<String, BTreeMap<EntityKey, Record>>,
    /// Append-only log of tracked runs per entity, in tracking order.
    history: HashMap<String, Vec<SyncResult>>,
    /// Number of existence lookups served, per entity.
    lookups: HashMap<String, usize>,
}

/// In-memory catalog and sync history store.
///
/// [`MemoryStore`] implements both [`CatalogStore`] and [`SyncHistoryStore`]. Nothing survives a
/// restart, which makes it the store of choice for tests and dry local runs. It also counts the
/// existence lookups it serves, so tests can check how often the importer queries the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` directly, bypassing the importer.
    pub async fn insert(&self, entity: &str, key: EntityKey, record: Record) {
        let mut inner = self.inner.lock().await;
        inner
            .entities
            .entry(entity.to_owned())
            .or_default()
            .insert(key, record);
    }

    pub async fn get(&self, entity: &str, key: &EntityKey) -> Option<Record> {
        let inner = self.inner.lock().await;
        inner.entities.get(entity)?.get(key).cloned()
    }

    /// Returns every stored record of `entity`, ordered by key.
    pub async fn records(&self, entity: &str) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner
            .entities
            .get(entity)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of existence lookups served for `entity`.
    pub async fn lookup_count(&self, entity: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.lookups.get(entity).copied().unwrap_or(0)
    }

    /// Tracked runs of `entity`, oldest first.
    pub async fn history(&self, entity: &str) -> Vec<SyncResult> {
        let inner = self.inner.lock().await;
        inner.history.get(entity).cloned().unwrap_or_default()
    }
}

impl CatalogStore for MemoryStore {
    async fn get_existing_entities(
        &self,
        entity: &str,
        key_fields: &[String],
        keys: &[EntityKey],
    ) -> EtlResult<HashMap<EntityKey, Record>> {
        if let Some(key) = keys.iter().find(|key| key.values().len() != key_fields.len()) {
            return Err(etl_error!(
                ErrorKind::InvalidState,
                "Entity key does not match the unique fields",
                format!("key `{key}` for fields {}", key_fields.join(", "))
            ));
        }

        let mut inner = self.inner.lock().await;
        *inner.lookups.entry(entity.to_owned()).or_default() += 1;

        let Some(records) = inner.entities.get(entity) else {
            return Ok(HashMap::new());
        };

        Ok(keys
            .iter()
            .filter_map(|key| Some((key.clone(), records.get(key)?.clone())))
            .collect())
    }

    async fn create(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        let records = inner.entities.entry(entity.to_owned()).or_default();

        if records.contains_key(key) {
            return Err(etl_error!(
                ErrorKind::PersistenceError,
                "Entity already exists",
                format!("{entity} `{key}`")
            ));
        }
        records.insert(key.clone(), record.clone());

        Ok(())
    }

    async fn update(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .entities
            .get_mut(entity)
            .and_then(|records| records.get_mut(key))
            .ok_or_else(|| {
                etl_error!(
                    ErrorKind::PersistenceError,
                    "Entity to update does not exist",
                    format!("{entity} `{key}`")
                )
            })?;
        *stored = record.clone();

        Ok(())
    }
}

impl SyncHistoryStore for MemoryStore {
    async fn track_sync(&self, entity: &str, result: &SyncResult) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .history
            .entry(entity.to_owned())
            .or_default()
            .push(result.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn lookups_return_only_stored_keys() {
        let store = MemoryStore::new();
        let fields = vec!["part_number".to_string()];
        store
            .insert("inventory", EntityKey::new(["A"]), record(json!({"part_number": "A"})))
            .await;

        let found = store
            .get_existing_entities("inventory", &fields, &[EntityKey::new(["A"]), EntityKey::new(["B"])])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&EntityKey::new(["A"])));
        assert_eq!(store.lookup_count("inventory").await, 1);
    }

    #[tokio::test]
    async fn writes_check_existence() {
        let store = MemoryStore::new();
        let key = EntityKey::new(["A"]);
        let data = record(json!({"part_number": "A", "quantity": 1}));

        let err = store.update("inventory", &key, &data).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceError);

        store.create("inventory", &key, &data).await.unwrap();
        let err = store.create("inventory", &key, &data).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceError);

        let updated = record(json!({"part_number": "A", "quantity": 2}));
        store.update("inventory", &key, &updated).await.unwrap();
        assert_eq!(store.get("inventory", &key).await, Some(updated));
    }
}

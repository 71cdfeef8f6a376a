use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::concurrency::deadline::with_deadline;
use crate::importer::base::Importer;
use crate::registry::FieldRegistry;
use crate::store::{CatalogStore, EntityKey, SyncHistoryStore};
use crate::types::{Record, RecordError, RecordRef, SyncResult};

/// Record of a batch together with its reference and unique key.
struct KeyedRecord {
    record_ref: RecordRef,
    key: EntityKey,
    record: Record,
}

/// Importer creating or updating records by their unique fields.
///
/// A batch costs exactly one existence lookup. Matched records are merged over the stored
/// entity, so fields the source does not provide are preserved; merges that change nothing are
/// counted as unchanged and not written. Records repeating a key already seen in the batch are
/// applied on top of the earlier record.
#[derive(Debug, Clone)]
pub struct UpsertImporter<S> {
    registry: Arc<FieldRegistry>,
    store: S,
    store_timeout: Duration,
}

impl<S> UpsertImporter<S>
where
    S: CatalogStore + SyncHistoryStore,
{
    /// Creates an importer bounding every store call by `store_timeout`.
    pub fn new(registry: Arc<FieldRegistry>, store: S, store_timeout: Duration) -> Self {
        Self {
            registry,
            store,
            store_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn fail_all<I>(result: &mut SyncResult, refs: I, message: &str)
    where
        I: IntoIterator<Item = RecordRef>,
    {
        for record_ref in refs {
            result.push_error(RecordError::new(record_ref, message));
        }
    }
}

impl<S> Importer for UpsertImporter<S>
where
    S: CatalogStore + SyncHistoryStore,
{
    async fn import_data(&self, entity: &str, records: Vec<Record>, dry_run: bool) -> SyncResult {
        let mut result = SyncResult::new(dry_run);

        let definitions = match self.registry.get(entity) {
            Ok(definitions) => definitions,
            Err(err) => {
                let refs = (1..=records.len()).map(RecordRef::Position);
                Self::fail_all(&mut result, refs, &err.message());
                return result;
            }
        };
        let key_fields = definitions.unique_fields();

        let mut batch = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let record_ref =
                RecordRef::from_key_value(record.get(definitions.primary_key()), index + 1);

            match EntityKey::from_record(&record, key_fields) {
                Some(key) => batch.push(KeyedRecord {
                    record_ref,
                    key,
                    record,
                }),
                None => result.push_error(RecordError::new(
                    record_ref,
                    format!("missing value for unique field(s) {}", key_fields.join(", ")),
                )),
            }
        }

        if batch.is_empty() {
            return result;
        }

        let keys: Vec<EntityKey> = batch
            .iter()
            .map(|keyed| keyed.key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let lookup = with_deadline(
            self.store_timeout,
            "entity lookup",
            self.store.get_existing_entities(entity, key_fields, &keys),
        )
        .await;
        let mut existing = match lookup {
            Ok(existing) => existing,
            Err(err) => {
                warn!(entity, records = batch.len(), error = %err, "existence lookup failed, dropping batch");
                let message = err.message();
                Self::fail_all(&mut result, batch.into_iter().map(|keyed| keyed.record_ref), &message);
                return result;
            }
        };

        for KeyedRecord {
            record_ref,
            key,
            record,
        } in batch
        {
            match existing.get(&key) {
                Some(current) => {
                    let mut merged = current.clone();
                    merged.extend(record);

                    if merged == *current {
                        result.unchanged += 1;
                        continue;
                    }

                    if !dry_run {
                        let update = with_deadline(
                            self.store_timeout,
                            "entity update",
                            self.store.update(entity, &key, &merged),
                        )
                        .await;
                        if let Err(err) = update {
                            result.push_error(RecordError::from_error(record_ref, &err));
                            continue;
                        }
                    }

                    result.updated += 1;
                    existing.insert(key, merged);
                }
                None => {
                    if !dry_run {
                        let create = with_deadline(
                            self.store_timeout,
                            "entity create",
                            self.store.create(entity, &key, &record),
                        )
                        .await;
                        if let Err(err) = create {
                            result.push_error(RecordError::from_error(record_ref, &err));
                            continue;
                        }
                    }

                    result.created += 1;
                    existing.insert(key, record);
                }
            }
        }

        debug!(
            entity,
            created = result.created,
            updated = result.updated,
            unchanged = result.unchanged,
            errors = result.errors.len(),
            dry_run,
            "imported batch"
        );

        result
    }

    async fn track_sync(&self, entity: &str, result: &SyncResult) {
        let tracked = with_deadline(
            self.store_timeout,
            "sync tracking",
            self.store.track_sync(entity, result),
        )
        .await;

        if let Err(err) = tracked {
            warn!(entity, error = %err, "failed to record sync history");
        }
    }
}

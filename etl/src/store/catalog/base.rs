use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use crate::error::EtlResult;
use crate::types::Record;

/// Value of an entity's unique fields, in declaration order.
///
/// A single unique field gives a one-element key, several unique fields a composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Vec<String>);

impl EntityKey {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Extracts the key of `record`, or `None` when a unique field is missing or blank.
    pub fn from_record(record: &Record, key_fields: &[String]) -> Option<EntityKey> {
        let mut values = Vec::with_capacity(key_fields.len());
        for field in key_fields {
            let value = match record.get(field)? {
                Value::String(value) => value.trim().to_owned(),
                Value::Number(value) => value.to_string(),
                Value::Bool(value) => value.to_string(),
                _ => return None,
            };
            if value.is_empty() {
                return None;
            }
            values.push(value);
        }

        Some(EntityKey(values))
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Stable textual form used as storage key.
    pub fn encode(&self) -> String {
        // Serializing a list of strings cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn decode(encoded: &str) -> serde_json::Result<EntityKey> {
        serde_json::from_str(encoded).map(EntityKey)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

/// Target store of canonical entities.
///
/// Implementations must be safe to share between the pipelines of several entities.
pub trait CatalogStore: Send + Sync {
    /// Returns the stored records of `entity` whose key is one of `keys`.
    ///
    /// Keys without a stored record are absent from the returned map.
    fn get_existing_entities(
        &self,
        entity: &str,
        key_fields: &[String],
        keys: &[EntityKey],
    ) -> impl Future<Output = EtlResult<HashMap<EntityKey, Record>>> + Send;

    /// Stores a new record under `key`.
    fn create(
        &self,
        entity: &str,
        key: &EntityKey,
        record: &Record,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Replaces the stored record under `key` with `record`.
    fn update(
        &self,
        entity: &str,
        key: &EntityKey,
        record: &Record,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}

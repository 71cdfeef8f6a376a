use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::registry::entity::EntityFieldDefinitions;
use crate::registry::model::TypedModel;

/// Thread-safe cache of typed models keyed by entity name.
///
/// Models are derived on first use and never evicted since the set of entities is fixed for the
/// lifetime of the registry.
#[derive(Debug, Clone, Default)]
pub struct TypedModelCache {
    inner: Arc<Mutex<HashMap<String, Arc<TypedModel>>>>,
}

impl TypedModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached model of the entity, deriving it from `definitions` on first use.
    pub fn get_or_create(&self, definitions: &EntityFieldDefinitions) -> Arc<TypedModel> {
        // A poisoned lock only means another thread panicked while inserting; the map itself is
        // still consistent.
        let mut models = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        models
            .entry(definitions.entity().to_owned())
            .or_insert_with(|| Arc::new(TypedModel::from_definitions(definitions)))
            .clone()
    }

    /// Number of cached models.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

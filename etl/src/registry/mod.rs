//! Field definition registry.
//!
//! The registry is the single source of truth for the canonical shape of every entity and its
//! layout in each source. Connectors use it to generate extraction queries and the processor
//! uses it to map and validate rows. It is built once and shared read-only behind an [`Arc`].

pub mod cache;
pub mod catalog;
pub mod entity;
pub mod field;
pub mod model;
pub mod transforms;

use catalog_config::shared::SourceType;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::registry::cache::TypedModelCache;
use crate::registry::entity::EntityFieldDefinitions;
use crate::registry::model::TypedModel;

static CATALOG: LazyLock<EtlResult<Arc<FieldRegistry>>> = LazyLock::new(|| {
    let definitions = catalog::catalog_definitions()?;
    FieldRegistry::new(definitions).map(Arc::new)
});

/// Immutable set of entity definitions with a cache of derived typed models.
#[derive(Debug)]
pub struct FieldRegistry {
    entities: BTreeMap<String, Arc<EntityFieldDefinitions>>,
    models: TypedModelCache,
}

impl FieldRegistry {
    /// Creates a registry, rejecting entities defined more than once.
    pub fn new<I>(definitions: I) -> EtlResult<Self>
    where
        I: IntoIterator<Item = EntityFieldDefinitions>,
    {
        let mut entities = BTreeMap::new();
        for definition in definitions {
            let entity = definition.entity().to_owned();
            if entities.insert(entity.clone(), Arc::new(definition)).is_some() {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Entity is defined more than once",
                    entity
                );
            }
        }

        Ok(Self {
            entities,
            models: TypedModelCache::new(),
        })
    }

    /// Returns the process-wide registry of the built-in catalog entities.
    pub fn catalog() -> EtlResult<Arc<FieldRegistry>> {
        CATALOG.clone()
    }

    /// Returns the definitions of `entity`.
    pub fn get(&self, entity: &str) -> EtlResult<Arc<EntityFieldDefinitions>> {
        match self.entities.get(entity) {
            Some(definitions) => Ok(definitions.clone()),
            None => bail!(
                ErrorKind::ConfigurationError,
                "Entity is not defined in the field registry",
                entity
            ),
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Generates the extraction query of `entity` for `source_type`, optionally restricted to
    /// the given canonical fields.
    pub fn generate_query(
        &self,
        entity: &str,
        source_type: SourceType,
        fields: Option<&[&str]>,
    ) -> EtlResult<String> {
        self.get(entity)?
            .generate_query_for_fields(source_type, fields)
    }

    /// Returns the typed model of `entity`, derived once and cached by name.
    pub fn create_typed_model(&self, entity: &str) -> EtlResult<Arc<TypedModel>> {
        let definitions = self.get(entity)?;
        Ok(self.models.get_or_create(&definitions))
    }

    /// Number of typed models derived so far.
    pub fn cached_models(&self) -> usize {
        self.models.len()
    }
}

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::Config;
use crate::shared::{
    EntityPipelineConfig, ParallelConfig, ProcessorConfig, SourceConfig, StoreConfig,
    ValidationError,
};

/// Top-level configuration of a sync process.
///
/// This intentionally does not implement `Serialize` since sources and the store carry secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Named source connections referenced by pipelines.
    pub sources: BTreeMap<String, SourceConfig>,
    pub store: StoreConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    pub pipelines: Vec<EntityPipelineConfig>,
}

impl SyncConfig {
    /// Validates every section and the references between pipelines and sources.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, source) in &self.sources {
            source
                .validate()
                .map_err(|err| err.with_prefix(&format!("sources.{name}")))?;
        }

        self.store.validate().map_err(|err| err.with_prefix("store"))?;
        self.processor
            .validate()
            .map_err(|err| err.with_prefix("processor"))?;
        self.parallel.validate()?;

        if self.pipelines.is_empty() {
            return Err(ValidationError::invalid(
                "pipelines",
                "at least one pipeline must be configured",
            ));
        }

        let mut entities = HashSet::new();
        for (index, pipeline) in self.pipelines.iter().enumerate() {
            pipeline
                .validate()
                .map_err(|err| err.with_prefix(&format!("pipelines[{index}]")))?;

            if !self.sources.contains_key(&pipeline.source) {
                return Err(ValidationError::UnknownSource {
                    entity: pipeline.entity.clone(),
                    source_name: pipeline.source.clone(),
                });
            }

            if !entities.insert(pipeline.entity.as_str()) {
                return Err(ValidationError::DuplicatePipeline(pipeline.entity.clone()));
            }
        }

        Ok(())
    }
}

impl Config for SyncConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

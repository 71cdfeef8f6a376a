use catalog_config::shared::{
    ChunkConfig, EntityPipelineConfig, ProcessorConfig, RetryConfig, TimeoutConfig,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::connectors::base::Connector;
use crate::error::EtlResult;
use crate::importer::UpsertImporter;
use crate::pipeline::Pipeline;
use crate::processor::CatalogProcessor;
use crate::registry::FieldRegistry;
use crate::store::{CatalogStore, SyncHistoryStore};
use crate::types::Row;

/// Pipeline wired with the catalog processor and the upsert importer.
pub type CatalogPipeline<C, S> = Pipeline<C, CatalogProcessor, UpsertImporter<S>>;

/// Builds a [`Row`] from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Returns `count` file-layout inventory rows with part numbers `P-00001`, `P-00002`, ...
pub fn inventory_rows(count: usize) -> Vec<Row> {
    (1..=count)
        .map(|n| {
            row(json!({
                "part_number": format!("P-{n:05}"),
                "warehouse": "main",
                "quantity": n.to_string(),
            }))
        })
        .collect()
}

/// Returns a pipeline configuration with short deadlines and fast connect retries.
pub fn pipeline_config(entity: &str, source: &str, chunk_size: usize) -> EntityPipelineConfig {
    EntityPipelineConfig {
        entity: entity.to_owned(),
        source: source.to_owned(),
        query: None,
        limit: None,
        params: Vec::new(),
        context: Map::new(),
        chunk: ChunkConfig { size: chunk_size },
        timeouts: TimeoutConfig {
            connect_ms: 1_000,
            extract_ms: 1_000,
            close_ms: 1_000,
            store_ms: 1_000,
        },
        connect_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 40,
        },
        dry_run: false,
    }
}

/// Wires `connector` and `store` into a [`CatalogPipeline`] for `config`.
pub fn catalog_pipeline<C, S>(
    registry: Arc<FieldRegistry>,
    config: EntityPipelineConfig,
    connector: C,
    store: S,
) -> EtlResult<CatalogPipeline<C, S>>
where
    C: Connector,
    S: CatalogStore + SyncHistoryStore,
{
    let processor = CatalogProcessor::new(
        &registry,
        &config.entity,
        connector.source_type(),
        config.context.clone(),
        &ProcessorConfig::default(),
    )?;
    let importer = UpsertImporter::new(registry.clone(), store, config.timeouts.store());

    Pipeline::new(config, registry, connector, processor, importer)
}

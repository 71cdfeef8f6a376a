use catalog_config::shared::{EntityPipelineConfig, SourceConfig, StoreConfig, SyncConfig};
use catalog_etl::connectors::{Connector, ErpConnector, FileConnector, OdbcConnector};
use catalog_etl::error::EtlResult;
use catalog_etl::importer::UpsertImporter;
use catalog_etl::migrations::apply_store_migrations;
use catalog_etl::pipeline::Pipeline;
use catalog_etl::processor::CatalogProcessor;
use catalog_etl::registry::FieldRegistry;
use catalog_etl::store::{CatalogStore, MemoryStore, PostgresStore, SyncHistoryStore};
use catalog_etl::workers::{ParallelPipeline, ParallelSyncReport};
use tracing::info;

use crate::error::{SyncerError, SyncerResult};

/// Command line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Entities to sync; every configured pipeline when empty.
    pub entities: Vec<String>,
    pub max_workers: Option<u16>,
}

/// Syncs the selected entities and returns their outcomes.
pub async fn run_sync(config: SyncConfig, options: &SyncOptions) -> SyncerResult<ParallelSyncReport> {
    let pipelines = select_pipelines(&config, options)?;
    let max_workers = options.max_workers.unwrap_or(config.parallel.max_workers);

    info!(
        entities = pipelines.len(),
        max_workers,
        dry_run = options.dry_run,
        "starting catalog sync"
    );

    match &config.store {
        StoreConfig::Memory => {
            run_with_store(&config, pipelines, max_workers, MemoryStore::new()).await
        }
        StoreConfig::Postgres(pg_config) => {
            apply_store_migrations(pg_config).await?;
            let store = PostgresStore::new(pg_config);

            run_with_store(&config, pipelines, max_workers, store).await
        }
    }
}

/// Returns the pipeline configurations to run, with the dry run override applied.
fn select_pipelines(
    config: &SyncConfig,
    options: &SyncOptions,
) -> SyncerResult<Vec<EntityPipelineConfig>> {
    if let Some(entity) = options
        .entities
        .iter()
        .find(|entity| !config.pipelines.iter().any(|p| &p.entity == *entity))
    {
        return Err(SyncerError::UnknownEntity(entity.clone()));
    }

    Ok(config
        .pipelines
        .iter()
        .filter(|pipeline| options.entities.is_empty() || options.entities.contains(&pipeline.entity))
        .cloned()
        .map(|mut pipeline| {
            pipeline.dry_run |= options.dry_run;
            pipeline
        })
        .collect())
}

fn build_connector(name: &str, source: &SourceConfig) -> EtlResult<Box<dyn Connector>> {
    let connector: Box<dyn Connector> = match source {
        SourceConfig::Erp(config) => Box::new(ErpConnector::new(name, config)?),
        SourceConfig::Odbc(config) => Box::new(OdbcConnector::new(name, config)?),
        SourceConfig::File(config) => Box::new(FileConnector::new(name, config)?),
    };

    Ok(connector)
}

async fn run_with_store<S>(
    config: &SyncConfig,
    pipelines: Vec<EntityPipelineConfig>,
    max_workers: u16,
    store: S,
) -> SyncerResult<ParallelSyncReport>
where
    S: CatalogStore + SyncHistoryStore + Clone + 'static,
{
    let registry = FieldRegistry::catalog()?;
    let mut built = Vec::with_capacity(pipelines.len());

    for pipeline_config in pipelines {
        let Some(source) = config.sources.get(&pipeline_config.source) else {
            return Err(SyncerError::UnknownSource {
                entity: pipeline_config.entity,
                source_name: pipeline_config.source,
            });
        };

        let connector = build_connector(&pipeline_config.source, source)?;
        let processor = CatalogProcessor::new(
            &registry,
            &pipeline_config.entity,
            source.source_type(),
            pipeline_config.context.clone(),
            &config.processor,
        )?;
        let importer = UpsertImporter::new(
            registry.clone(),
            store.clone(),
            pipeline_config.timeouts.store(),
        );

        built.push(Pipeline::new(
            pipeline_config,
            registry.clone(),
            connector,
            processor,
            importer,
        )?);
    }

    let parallel = ParallelPipeline::new(built, max_workers)?;

    Ok(parallel.run().await)
}

use catalog_config::LoadConfigError;
use catalog_config::shared::ValidationError;
use catalog_etl::error::EtlError;
use catalog_telemetry::tracing::TracingError;
use thiserror::Error;

pub type SyncerResult<T> = Result<T, SyncerError>;

/// Errors that stop the syncer before or while it builds its pipelines.
///
/// Failures of single entities are not errors here, they are reported per entity.
#[derive(Debug, Error)]
pub enum SyncerError {
    #[error("configuration error: {0}")]
    Load(#[from] LoadConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] TracingError),

    #[error("no pipeline is configured for entity `{0}`")]
    UnknownEntity(String),

    #[error("pipeline `{entity}` references unknown source `{source_name}`")]
    UnknownSource { entity: String, source_name: String },

    #[error("{0}")]
    Etl(#[from] EtlError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

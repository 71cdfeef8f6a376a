//! Shared configuration types for catalog sync pipelines.

mod base;
mod erp;
mod file;
mod odbc;
mod pipeline;
mod processor;
mod source;
mod store;
mod sync;

pub use base::ValidationError;
pub use erp::{ErpConnectionConfig, ErpNaming};
pub use file::{FileEncoding, FileFormat, FileSourceConfig};
pub use odbc::OdbcConnectionConfig;
pub use pipeline::{ChunkConfig, EntityPipelineConfig, ParallelConfig, RetryConfig, TimeoutConfig};
pub use processor::{BooleanTokensConfig, ProcessorConfig};
pub use source::{SourceConfig, SourceType};
pub use store::{IntoConnectOptions, PgConnectionConfig, StoreConfig, TlsConfig};
pub use sync::SyncConfig;

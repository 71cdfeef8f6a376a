//! Single-entity pipeline.
//!
//! A [`Pipeline`] syncs one entity from one source: it connects, extracts the source in chunks,
//! validates and imports every chunk, then closes the connector on every exit path. Chunks are
//! processed strictly one after the other, so at most one chunk of rows is held in memory.

use catalog_config::shared::EntityPipelineConfig;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::concurrency::deadline::with_deadline;
use crate::concurrency::signal::{PhaseRx, PhaseTx, create_phase_signal};
use crate::connectors::base::Connector;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::importer::base::Importer;
use crate::processor::base::{Processor, ValidationOutcome};
use crate::registry::FieldRegistry;
use crate::types::{RecordError, RecordRef, SyncResult};
use crate::workers::policy::build_error_handling_policy;

/// Result of [`Pipeline::run`].
pub type RunResult = Result<SyncResult, RunFailure>;

/// Fatal failure of a pipeline run.
///
/// A run can fail after some chunks were already imported. Those writes stay in the store and
/// `partial` holds their result, marked as aborted.
#[derive(Debug, Clone, Error)]
#[error("{}", .error.message())]
pub struct RunFailure {
    #[source]
    pub error: EtlError,
    pub partial: Option<SyncResult>,
}

impl RunFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.message()
    }

    /// Returns `true` when records were created or updated before the run failed.
    pub fn wrote_records(&self) -> bool {
        self.partial
            .as_ref()
            .is_some_and(|partial| !partial.dry_run && partial.created + partial.updated > 0)
    }
}

impl From<EtlError> for RunFailure {
    fn from(error: EtlError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// Observable phase of a pipeline run. Chunk numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Connecting,
    Extracting(usize),
    Processing(usize),
    Importing(usize),
    Closing,
    Done,
    Failed,
}

/// Per-run options of [`Pipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of rows to extract in total.
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Shifts position references of chunk-local row errors to positions in the run.
fn rebase(errors: Vec<RecordError>, offset: usize) -> impl Iterator<Item = RecordError> {
    errors.into_iter().map(move |error| RecordError {
        record_ref: error.record_ref.offset(offset),
        message: error.message,
    })
}

/// Maps position references of import errors, which count validated records, back to the
/// position of their source row in the run.
fn rebase_records(
    errors: Vec<RecordError>,
    row_positions: &[usize],
    offset: usize,
) -> impl Iterator<Item = RecordError> + '_ {
    errors.into_iter().map(move |error| {
        let record_ref = match error.record_ref {
            RecordRef::Position(position) => {
                let row = position
                    .checked_sub(1)
                    .and_then(|index| row_positions.get(index))
                    .copied()
                    .unwrap_or(position);
                RecordRef::Position(offset + row)
            }
            key => key,
        };

        RecordError {
            record_ref,
            message: error.message,
        }
    })
}

#[derive(Debug)]
pub struct Pipeline<C, P, I> {
    config: Arc<EntityPipelineConfig>,
    registry: Arc<FieldRegistry>,
    connector: C,
    processor: P,
    importer: I,
    phase_tx: PhaseTx,
}

impl<C, P, I> Pipeline<C, P, I>
where
    C: Connector,
    P: Processor,
    I: Importer,
{
    /// Creates a pipeline, checking that its parts agree on the entity.
    pub fn new(
        config: EntityPipelineConfig,
        registry: Arc<FieldRegistry>,
        connector: C,
        processor: P,
        importer: I,
    ) -> EtlResult<Self> {
        config.validate()?;

        if processor.entity() != config.entity {
            bail!(
                ErrorKind::ConfigurationError,
                "Processor and pipeline disagree on the entity",
                format!("pipeline `{}`, processor `{}`", config.entity, processor.entity())
            );
        }

        let definitions = registry.get(&config.entity)?;
        if !definitions.supports(connector.source_type()) {
            bail!(
                ErrorKind::ConfigurationError,
                "Entity has no layout for the connector's source type",
                format!("{} from {}", config.entity, connector.source_type().as_str())
            );
        }

        let (phase_tx, _) = create_phase_signal();

        Ok(Self {
            config: Arc::new(config),
            registry,
            connector,
            processor,
            importer,
            phase_tx,
        })
    }

    pub fn entity(&self) -> &str {
        &self.config.entity
    }

    pub fn config(&self) -> &EntityPipelineConfig {
        &self.config
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.phase_tx.borrow()
    }

    /// Returns a receiver following the phase of this pipeline.
    pub fn subscribe(&self) -> PhaseRx {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: PipelinePhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Runs the pipeline with the query, parameters and options of its configuration.
    pub async fn run_configured(&mut self) -> RunResult {
        let config = self.config.clone();
        let options = RunOptions {
            limit: config.limit,
            dry_run: config.dry_run,
        };

        self.run(config.query.as_deref(), &config.params, options).await
    }

    /// Syncs the entity once.
    ///
    /// Without an explicit `query` the extraction query is generated from the field
    /// definitions. Connector failures are fatal and returned as a [`RunFailure`], carrying the
    /// result of the chunks imported before the failure; failures of single rows or records are
    /// reported in the returned [`SyncResult`]. The connector is closed on every path, and the
    /// result, partial or not, is tracked unless the run is a dry run.
    pub async fn run(
        &mut self,
        query: Option<&str>,
        params: &[Value],
        options: RunOptions,
    ) -> RunResult {
        let entity = self.config.entity.clone();
        let query = match query {
            Some(query) => query.to_owned(),
            None => self
                .registry
                .generate_query(&entity, self.connector.source_type(), None)?,
        };

        info!(
            entity = %entity,
            source = self.connector.name(),
            dry_run = options.dry_run,
            "starting pipeline run"
        );

        self.set_phase(PipelinePhase::Connecting);
        let outcome = match self.connect_with_retry().await {
            Ok(()) => self.sync_chunks(&query, params, options).await,
            Err(err) => Err(RunFailure::from(err)),
        };

        self.set_phase(PipelinePhase::Closing);
        let closed = with_deadline(
            self.config.timeouts.close(),
            "close",
            self.connector.close(),
        )
        .await;
        if let Err(err) = closed {
            warn!(entity = %entity, error = %err, "failed to close connector");
        }

        match outcome {
            Ok(result) => {
                if !options.dry_run {
                    self.importer.track_sync(&entity, &result).await;
                }

                self.set_phase(PipelinePhase::Done);
                info!(
                    entity = %entity,
                    created = result.created,
                    updated = result.updated,
                    unchanged = result.unchanged,
                    errors = result.errors.len(),
                    "pipeline run completed"
                );

                Ok(result)
            }
            Err(failure) => {
                self.set_phase(PipelinePhase::Failed);

                match &failure.partial {
                    Some(partial) => {
                        if !options.dry_run {
                            self.importer.track_sync(&entity, partial).await;
                        }

                        error!(
                            entity = %entity,
                            error = %failure.error,
                            created = partial.created,
                            updated = partial.updated,
                            unchanged = partial.unchanged,
                            errors = partial.errors.len(),
                            "pipeline run failed after importing earlier chunks"
                        );
                    }
                    None => error!(entity = %entity, error = %failure.error, "pipeline run failed"),
                }

                Err(failure)
            }
        }
    }

    async fn connect_with_retry(&mut self) -> EtlResult<()> {
        let retry = self.config.connect_retry.clone();
        let timeout = self.config.timeouts.connect();
        let mut attempt = 1;

        loop {
            let err = match with_deadline(timeout, "connect", self.connector.connect()).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !build_error_handling_policy(&err).is_retryable() || attempt >= retry.max_attempts {
                return Err(err);
            }

            let delay = retry.delay_for(attempt);
            warn!(
                entity = %self.config.entity,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "connect failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn sync_chunks(
        &mut self,
        query: &str,
        params: &[Value],
        options: RunOptions,
    ) -> RunResult {
        let chunk_size = self.config.chunk.size;
        let extract_timeout = self.config.timeouts.extract();
        let mut total = SyncResult::new(options.dry_run);
        let mut offset = 0;
        let mut chunk = 0;

        loop {
            let size = match options.limit {
                Some(limit) if offset >= limit => break,
                Some(limit) => (limit - offset).min(chunk_size),
                None => chunk_size,
            };

            chunk += 1;
            self.set_phase(PipelinePhase::Extracting(chunk));
            let extracted = with_deadline(
                extract_timeout,
                "extract",
                self.connector.extract_chunk(query, params, offset, size),
            )
            .await;
            let rows = match extracted {
                Ok(rows) => rows,
                Err(error) => {
                    let partial = if offset > 0 {
                        total.aborted = true;
                        Some(total)
                    } else {
                        None
                    };

                    return Err(RunFailure { error, partial });
                }
            };

            let fetched = rows.len();
            if fetched == 0 {
                break;
            }

            self.set_phase(PipelinePhase::Processing(chunk));
            let ValidationOutcome {
                records,
                row_positions,
                errors,
            } = self.processor.validate(&rows);
            drop(rows);
            total.errors.extend(rebase(errors, offset));

            self.set_phase(PipelinePhase::Importing(chunk));
            if !records.is_empty() {
                let mut imported = self
                    .importer
                    .import_data(&self.config.entity, records, options.dry_run)
                    .await;
                let errors = std::mem::take(&mut imported.errors);
                total.merge(imported);
                total
                    .errors
                    .extend(rebase_records(errors, &row_positions, offset));
            }

            debug!(
                entity = %self.config.entity,
                chunk,
                rows = fetched,
                errors = total.errors.len(),
                "chunk synced"
            );

            offset += fetched;
            if fetched < size {
                break;
            }
        }

        Ok(total)
    }
}

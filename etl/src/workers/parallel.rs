use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::bail;
use crate::connectors::base::Connector;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::importer::base::Importer;
use crate::pipeline::{Pipeline, RunFailure};
use crate::processor::base::Processor;
use crate::types::SyncResult;
use crate::workers::policy::build_error_handling_policy;

/// Failure that aborted the run of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Whether rerunning the entity may succeed without operator action.
    pub retryable: bool,
    /// Result of the chunks imported before the failure.
    pub partial: Option<SyncResult>,
}

impl FatalFailure {
    /// Returns `true` when the entity created or updated records before failing.
    pub fn wrote_records(&self) -> bool {
        self.partial
            .as_ref()
            .is_some_and(|partial| !partial.dry_run && partial.created + partial.updated > 0)
    }
}

impl From<&EtlError> for FatalFailure {
    fn from(err: &EtlError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message(),
            retryable: build_error_handling_policy(err).is_retryable(),
            partial: None,
        }
    }
}

impl From<RunFailure> for FatalFailure {
    fn from(failure: RunFailure) -> Self {
        Self {
            partial: failure.partial,
            ..FatalFailure::from(&failure.error)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    Completed(SyncResult),
    Failed(FatalFailure),
}

impl EntityOutcome {
    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            EntityOutcome::Completed(result) => Some(result),
            EntityOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FatalFailure> {
        match self {
            EntityOutcome::Completed(_) => None,
            EntityOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Outcomes of a [`ParallelPipeline`] run, by entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelSyncReport {
    outcomes: BTreeMap<String, EntityOutcome>,
}

impl ParallelSyncReport {
    pub fn get(&self, entity: &str) -> Option<&EntityOutcome> {
        self.outcomes.get(entity)
    }

    pub fn outcomes(&self) -> &BTreeMap<String, EntityOutcome> {
        &self.outcomes
    }

    /// Returns `true` when at least one entity failed as a whole.
    pub fn has_fatal_failures(&self) -> bool {
        self.outcomes
            .values()
            .any(|outcome| outcome.failure().is_some())
    }

    pub fn failed_entities(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.failure().is_some())
            .map(|(entity, _)| entity.as_str())
            .collect()
    }

    /// Failed entities that created or updated records before failing.
    pub fn failed_after_writes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.failure().is_some_and(FatalFailure::wrote_records))
            .map(|(entity, _)| entity.as_str())
            .collect()
    }

    /// Entities that completed but dropped some rows or records.
    pub fn partial_entities(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.result().is_some_and(SyncResult::has_errors))
            .map(|(entity, _)| entity.as_str())
            .collect()
    }

    /// Sum of the results of every entity, including what failed entities imported before
    /// failing.
    pub fn totals(&self) -> SyncResult {
        let mut totals = SyncResult::default();
        let results = self.outcomes.values().filter_map(|outcome| match outcome {
            EntityOutcome::Completed(result) => Some(result),
            EntityOutcome::Failed(failure) => failure.partial.as_ref(),
        });
        for result in results {
            totals.dry_run |= result.dry_run;
            totals.merge(result.clone());
        }

        totals
    }
}

/// Runs independent single-entity pipelines concurrently.
///
/// At most `max_workers` pipelines run at the same time. Every pipeline owns its connector, so
/// a failing or panicking pipeline only marks its own entity as failed.
#[derive(Debug)]
pub struct ParallelPipeline<C, P, I> {
    pipelines: Vec<Pipeline<C, P, I>>,
    max_workers: usize,
}

impl<C, P, I> ParallelPipeline<C, P, I>
where
    C: Connector + 'static,
    P: Processor + 'static,
    I: Importer + 'static,
{
    pub fn new(pipelines: Vec<Pipeline<C, P, I>>, max_workers: u16) -> EtlResult<Self> {
        if max_workers == 0 {
            bail!(
                ErrorKind::ConfigurationError,
                "At least one parallel worker is required"
            );
        }

        let mut entities = HashSet::new();
        for pipeline in &pipelines {
            if !entities.insert(pipeline.entity().to_owned()) {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Entity is synced by more than one pipeline",
                    pipeline.entity()
                );
            }
        }

        Ok(Self {
            pipelines,
            max_workers: max_workers as usize,
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(Pipeline::entity)
    }

    /// Runs every pipeline with its configured options and joins their outcomes.
    pub async fn run(self) -> ParallelSyncReport {
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let entities: Vec<String> = self.entities().map(str::to_owned).collect();
        let mut join_set = JoinSet::new();

        info!(
            pipelines = entities.len(),
            max_workers = self.max_workers,
            "starting parallel sync"
        );

        for mut pipeline in self.pipelines {
            let permits = permits.clone();

            join_set.spawn(async move {
                let entity = pipeline.entity().to_owned();

                let permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        let err = etl_error!(
                            ErrorKind::InvalidState,
                            "Could not acquire a worker permit",
                            err
                        );
                        return (entity, Err(RunFailure::from(err)));
                    }
                };

                let result = match AssertUnwindSafe(pipeline.run_configured())
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RunFailure::from(etl_error!(
                        ErrorKind::PipelineWorkerPanic,
                        "Pipeline worker panicked",
                        entity
                    ))),
                };
                drop(permit);

                (entity, result)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((entity, Ok(result))) => {
                    outcomes.insert(entity, EntityOutcome::Completed(result));
                }
                Ok((entity, Err(failure))) => {
                    error!(
                        entity = %entity,
                        error = %failure.error,
                        wrote_records = failure.wrote_records(),
                        "entity sync failed"
                    );
                    outcomes.insert(entity, EntityOutcome::Failed(FatalFailure::from(failure)));
                }
                Err(join_err) => {
                    warn!(error = %join_err, "pipeline worker task did not complete");
                }
            }
        }

        // Workers whose task was lost report no entity, so they are matched up here.
        for entity in entities {
            outcomes.entry(entity).or_insert_with_key(|entity| {
                let err = etl_error!(
                    ErrorKind::PipelineWorkerPanic,
                    "Pipeline worker did not report an outcome",
                    entity
                );
                EntityOutcome::Failed(FatalFailure::from(&err))
            });
        }

        let report = ParallelSyncReport { outcomes };
        info!(
            failed = report.failed_entities().len(),
            failed_after_writes = report.failed_after_writes().len(),
            partial = report.partial_entities().len(),
            "parallel sync completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordError, RecordRef};

    fn report(outcomes: Vec<(&str, EntityOutcome)>) -> ParallelSyncReport {
        ParallelSyncReport {
            outcomes: outcomes
                .into_iter()
                .map(|(entity, outcome)| (entity.to_owned(), outcome))
                .collect(),
        }
    }

    #[test]
    fn report_separates_failed_and_partial_entities() {
        let partial = SyncResult {
            created: 2,
            errors: vec![RecordError::new(RecordRef::Position(4), "missing part number")],
            ..SyncResult::default()
        };
        let clean = SyncResult {
            updated: 3,
            ..SyncResult::default()
        };
        let failure = FatalFailure::from(&EtlError::from((
            ErrorKind::SourceConnectionFailed,
            "bridge unreachable",
        )));

        let report = report(vec![
            ("inventory", EntityOutcome::Completed(partial)),
            ("pricing", EntityOutcome::Failed(failure)),
            ("products", EntityOutcome::Completed(clean)),
        ]);

        assert!(report.has_fatal_failures());
        assert_eq!(report.failed_entities(), vec!["pricing"]);
        assert!(report.failed_after_writes().is_empty());
        assert_eq!(report.partial_entities(), vec!["inventory"]);

        let totals = report.totals();
        assert_eq!((totals.created, totals.updated), (2, 3));
        assert_eq!(totals.errors.len(), 1);

        let failure = report.get("pricing").and_then(EntityOutcome::failure).unwrap();
        assert_eq!(failure.kind, ErrorKind::SourceConnectionFailed);
        assert!(failure.retryable);
    }

    #[test]
    fn failures_after_earlier_chunks_keep_their_partial_result() {
        let imported = SyncResult {
            created: 10,
            aborted: true,
            ..SyncResult::default()
        };
        let failure = FatalFailure::from(RunFailure {
            error: EtlError::from((ErrorKind::SourceIoError, "bridge dropped the session")),
            partial: Some(imported),
        });
        assert!(failure.wrote_records());
        assert!(failure.retryable);

        let report = report(vec![
            ("inventory", EntityOutcome::Failed(failure)),
            (
                "products",
                EntityOutcome::Completed(SyncResult {
                    created: 1,
                    ..SyncResult::default()
                }),
            ),
        ]);

        assert_eq!(report.failed_entities(), vec!["inventory"]);
        assert_eq!(report.failed_after_writes(), vec!["inventory"]);

        let totals = report.totals();
        assert_eq!(totals.created, 11);
        assert!(totals.aborted);
    }

    #[test]
    fn security_failures_are_not_retryable() {
        let failure = FatalFailure::from(&EtlError::from((
            ErrorKind::SecurityViolation,
            "table is not allow-listed",
        )));

        assert!(!failure.retryable);
        assert!(failure.message.contains("allow-listed"));
    }
}

//! Catalog sync binary.
//!
//! Loads the sync configuration, runs the configured entity pipelines in parallel and reports
//! the outcome of every entity. Exits with status 1 when any entity failed as a whole.

use catalog_config::load_config;
use catalog_config::shared::SyncConfig;
use catalog_etl::workers::{EntityOutcome, ParallelSyncReport};
use catalog_telemetry::tracing::init_tracing;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::core::{SyncOptions, run_sync};
use crate::error::SyncerResult;

mod core;
mod error;

#[derive(Debug, Parser)]
#[command(name = "catalog-syncer", version, about = "Syncs the legacy catalog sources into the catalog store")]
struct AppArgs {
    /// Validate and count changes without writing to the store
    #[arg(long)]
    dry_run: bool,

    /// Entity to sync; may be repeated. Every configured entity is synced when omitted
    #[arg(long = "entity", value_name = "NAME")]
    entities: Vec<String>,

    /// Overrides the configured maximum number of concurrent pipelines
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    max_workers: Option<u16>,
}

fn main() -> ExitCode {
    let args = AppArgs::parse();

    match run(args) {
        Ok(report) if report.has_fatal_failures() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("catalog-syncer failed: {err}");

            ExitCode::FAILURE
        }
    }
}

fn run(args: AppArgs) -> SyncerResult<ParallelSyncReport> {
    let config = load_config::<SyncConfig>()?;
    config.validate()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    let options = SyncOptions {
        dry_run: args.dry_run,
        entities: args.entities,
        max_workers: args.max_workers,
    };

    let report = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_sync(config, &options))?;

    log_report(&report);

    Ok(report)
}

fn log_report(report: &ParallelSyncReport) {
    for (entity, outcome) in report.outcomes() {
        match outcome {
            EntityOutcome::Completed(result) if result.has_errors() => warn!(
                entity = %entity,
                created = result.created,
                updated = result.updated,
                unchanged = result.unchanged,
                errors = result.errors.len(),
                "entity synced with dropped records"
            ),
            EntityOutcome::Completed(result) => info!(
                entity = %entity,
                created = result.created,
                updated = result.updated,
                unchanged = result.unchanged,
                "entity synced"
            ),
            EntityOutcome::Failed(failure) => match &failure.partial {
                Some(partial) => error!(
                    entity = %entity,
                    kind = ?failure.kind,
                    retryable = failure.retryable,
                    created = partial.created,
                    updated = partial.updated,
                    unchanged = partial.unchanged,
                    "entity failed after importing earlier chunks: {}",
                    failure.message
                ),
                None => error!(
                    entity = %entity,
                    kind = ?failure.kind,
                    retryable = failure.retryable,
                    "entity failed: {}",
                    failure.message
                ),
            },
        }
    }

    let totals = report.totals();
    info!(
        created = totals.created,
        updated = totals.updated,
        unchanged = totals.unchanged,
        errors = totals.errors.len(),
        failed = report.failed_entities().len(),
        failed_after_writes = report.failed_after_writes().len(),
        dry_run = totals.dry_run,
        "catalog sync finished"
    );
}

use catalog_config::shared::SourceType;
use catalog_etl::error::ErrorKind;
use catalog_etl::pipeline::{PipelinePhase, RunOptions};
use catalog_etl::registry::FieldRegistry;
use catalog_etl::registry::catalog::INVENTORY;
use catalog_etl::registry::entity::{EntityFieldDefinitions, TableInfo};
use catalog_etl::registry::field::{FieldDefinition, FieldType};
use catalog_etl::store::{EntityKey, MemoryStore};
use catalog_etl::test_utils::connector::MockConnector;
use catalog_etl::test_utils::fixtures::{catalog_pipeline, inventory_rows, pipeline_config, row};
use catalog_etl::test_utils::store::FaultyStore;
use catalog_etl::types::RecordRef;
use catalog_telemetry::tracing::init_test_tracing;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn chunked_run_imports_every_chunk_and_closes_once() {
    init_test_tracing();

    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();
    let connector = MockConnector::new(SourceType::File, inventory_rows(25));
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        registry.clone(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        store.clone(),
    )
    .unwrap();
    let phase = pipeline.subscribe();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 25);
    assert!(result.errors.is_empty());
    assert_eq!(calls.pages(), vec![(0, 10), (10, 10), (20, 10)]);
    assert_eq!(calls.connect_attempts(), 1);
    assert_eq!(calls.closes(), 1);
    assert_eq!(
        calls.queries()[0],
        registry
            .generate_query(INVENTORY, SourceType::File, None)
            .unwrap()
    );

    let stored = store
        .get(INVENTORY, &EntityKey::new(["P-00007"]))
        .await
        .unwrap();
    assert_eq!(stored["warehouse"], json!("MAIN"));
    assert_eq!(stored["quantity"], json!(7));

    assert_eq!(store.history(INVENTORY).await, vec![result]);
    assert_eq!(*phase.borrow(), PipelinePhase::Done);
    assert_eq!(pipeline.phase(), PipelinePhase::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn rerunning_the_same_source_changes_nothing() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        MockConnector::new(SourceType::File, inventory_rows(25)),
        store.clone(),
    )
    .unwrap();

    let first = pipeline.run_configured().await.unwrap();
    let before = store.records(INVENTORY).await;
    let second = pipeline.run_configured().await.unwrap();

    assert_eq!(first.created, 25);
    assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 25));
    assert_eq!(store.records(INVENTORY).await, before);
    assert_eq!(store.history(INVENTORY).await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn row_errors_reference_their_position_in_the_run() {
    init_test_tracing();

    let mut rows = inventory_rows(15);
    rows[12] = row(json!({"part_number": "  ", "warehouse": "east", "quantity": "4"}));
    let store = MemoryStore::new();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        MockConnector::new(SourceType::File, rows),
        store.clone(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 14);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].record_ref, RecordRef::Position(13));
    assert_eq!(store.records(INVENTORY).await.len(), 14);
}

#[tokio::test(flavor = "multi_thread")]
async fn importer_errors_point_at_source_rows_after_dropped_rows() {
    init_test_tracing();

    let parts = EntityFieldDefinitions::builder("parts")
        .primary_key("code")
        .unique_fields(["code"])
        .table(SourceType::File, TableInfo::primary("PARTS"))
        .field(FieldDefinition::new("code", FieldType::String).mapped(
            SourceType::File,
            "PARTS",
            "code",
        ))
        .field(
            FieldDefinition::new("qty", FieldType::Integer)
                .required()
                .mapped(SourceType::File, "PARTS", "qty"),
        )
        .build()
        .unwrap();
    let registry = Arc::new(FieldRegistry::new(vec![parts]).unwrap());
    let rows = vec![
        row(json!({"code": "A", "qty": "1"})),
        row(json!({"code": "B", "qty": "2"})),
        row(json!({"code": "C", "qty": "x"})),
        row(json!({"code": "", "qty": "4"})),
    ];
    let store = MemoryStore::new();
    let mut pipeline = catalog_pipeline(
        registry,
        pipeline_config("parts", "files", 2),
        MockConnector::new(SourceType::File, rows),
        store.clone(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 2);
    let refs: Vec<RecordRef> = result
        .errors
        .iter()
        .map(|error| error.record_ref.clone())
        .collect();
    assert_eq!(
        refs,
        vec![RecordRef::Key("C".to_string()), RecordRef::Position(4)]
    );
    assert_eq!(store.records("parts").await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retryable_connect_failures_are_retried_with_backoff() {
    init_test_tracing();

    let connector = MockConnector::new(SourceType::File, inventory_rows(3))
        .failing_connect(ErrorKind::SourceConnectionFailed, 2);
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        MemoryStore::new(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(calls.connect_attempts(), 3);
    assert_eq!(result.created, 3);
}

#[tokio::test(start_paused = true)]
async fn connect_retries_stop_after_the_configured_attempts() {
    init_test_tracing();

    let connector = MockConnector::new(SourceType::File, inventory_rows(3))
        .failing_connect(ErrorKind::NetworkTimeout, 10);
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        MemoryStore::new(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
    assert_eq!(calls.connect_attempts(), 3);
    assert_eq!(calls.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn authentication_failures_are_fatal_without_retry() {
    init_test_tracing();

    let store = MemoryStore::new();
    let connector = MockConnector::new(SourceType::File, inventory_rows(3))
        .failing_connect(ErrorKind::AuthenticationFailed, 1);
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        store.clone(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert_eq!(calls.connect_attempts(), 1);
    assert_eq!(calls.closes(), 1);
    assert_eq!(pipeline.phase(), PipelinePhase::Failed);
    assert!(store.history(INVENTORY).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn extraction_failures_close_the_connector_and_keep_earlier_chunks() {
    init_test_tracing();

    let store = MemoryStore::new();
    let connector = MockConnector::new(SourceType::File, inventory_rows(25))
        .failing_extract_at(10, ErrorKind::SourceIoError);
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        store.clone(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceIoError);
    assert_eq!(calls.closes(), 1);
    assert_eq!(store.records(INVENTORY).await.len(), 10);

    let partial = err.partial.as_ref().unwrap();
    assert_eq!(partial.created, 10);
    assert!(partial.aborted);
    assert!(err.wrote_records());

    let history = store.history(INVENTORY).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].aborted);
    assert_eq!(history[0].created, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_in_the_first_chunk_carry_no_partial_result() {
    init_test_tracing();

    let store = MemoryStore::new();
    let connector = MockConnector::new(SourceType::File, inventory_rows(5))
        .failing_extract_at(0, ErrorKind::SourceIoError);
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        store.clone(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceIoError);
    assert!(err.partial.is_none());
    assert!(!err.wrote_records());
    assert!(store.history(INVENTORY).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_extractions_hit_their_deadline() {
    init_test_tracing();

    let connector = MockConnector::new(SourceType::File, inventory_rows(3))
        .with_extract_delay(Duration::from_secs(5));
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        MemoryStore::new(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
    assert!(err.message().contains("extract"));
    assert_eq!(calls.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_failures_do_not_fail_the_run() {
    init_test_tracing();

    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        MockConnector::new(SourceType::File, inventory_rows(3)).failing_close(),
        MemoryStore::new(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 3);
    assert_eq!(pipeline.phase(), PipelinePhase::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_runs_count_without_writing_or_tracking() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        MockConnector::new(SourceType::File, inventory_rows(12)),
        store.clone(),
    )
    .unwrap();

    let options = RunOptions {
        limit: None,
        dry_run: true,
    };
    let result = pipeline.run(None, &[], options).await.unwrap();

    assert!(result.dry_run);
    assert_eq!(result.created, 12);
    assert!(store.records(INVENTORY).await.is_empty());
    assert!(store.history(INVENTORY).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn limits_cap_the_extracted_rows() {
    init_test_tracing();

    let connector = MockConnector::new(SourceType::File, inventory_rows(40));
    let calls = connector.handle();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        MemoryStore::new(),
    )
    .unwrap();

    let options = RunOptions {
        limit: Some(15),
        dry_run: false,
    };
    let result = pipeline
        .run(Some("SELECT * FROM INVENTORY"), &[], options)
        .await
        .unwrap();

    assert_eq!(result.created, 15);
    assert_eq!(calls.pages(), vec![(0, 10), (10, 5)]);
    assert_eq!(calls.queries()[0], "SELECT * FROM INVENTORY");
}

#[tokio::test(flavor = "multi_thread")]
async fn history_failures_are_not_propagated() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    store.fail_history(true);
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        MockConnector::new(SourceType::File, inventory_rows(2)),
        store.clone(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 2);
    assert!(store.inner().history(INVENTORY).await.is_empty());
}

#[test]
fn invalid_pipeline_configuration_is_rejected() {
    let registry = FieldRegistry::catalog().unwrap();
    let mut config = pipeline_config(INVENTORY, "files", 10);
    config.chunk.size = 0;

    let err = catalog_pipeline(
        registry,
        config,
        MockConnector::new(SourceType::File, Vec::new()),
        MemoryStore::new(),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

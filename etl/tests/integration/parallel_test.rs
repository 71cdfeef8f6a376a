use catalog_config::shared::SourceType;
use catalog_etl::error::ErrorKind;
use catalog_etl::registry::FieldRegistry;
use catalog_etl::registry::catalog::{INVENTORY, PRICING};
use catalog_etl::store::MemoryStore;
use catalog_etl::test_utils::connector::MockConnector;
use catalog_etl::test_utils::fixtures::{catalog_pipeline, inventory_rows, pipeline_config, row};
use catalog_etl::workers::{EntityOutcome, ParallelPipeline};
use catalog_telemetry::tracing::init_test_tracing;
use serde_json::{Value, json};

fn pricing_rows() -> Vec<serde_json::Map<String, Value>> {
    vec![
        row(json!({"part_number": "P-00001", "jobber_price": "10.50", "export_price": "12.00"})),
        row(json!({"part_number": "P-00002", "jobber_price": "3.25", "export_price": "4.00"})),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_source_only_fails_its_entity() {
    init_test_tracing();

    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();

    let mut pricing_config = pipeline_config(PRICING, "erp", 10);
    pricing_config.context.insert("pricing_type".to_owned(), json!("jobber"));
    let pricing_connector = MockConnector::new(SourceType::File, pricing_rows())
        .failing_connect(ErrorKind::SourceConnectionFailed, usize::MAX);
    let pricing_calls = pricing_connector.handle();

    let pipelines = vec![
        catalog_pipeline(
            registry.clone(),
            pipeline_config(INVENTORY, "files", 10),
            MockConnector::new(SourceType::File, inventory_rows(12)),
            store.clone(),
        )
        .unwrap(),
        catalog_pipeline(registry, pricing_config, pricing_connector, store.clone()).unwrap(),
    ];

    let report = ParallelPipeline::new(pipelines, 2).unwrap().run().await;

    assert!(report.has_fatal_failures());
    assert_eq!(report.failed_entities(), vec![PRICING]);

    let inventory = report.get(INVENTORY).and_then(EntityOutcome::result).unwrap();
    assert_eq!(inventory.created, 12);
    assert_eq!(store.records(INVENTORY).await.len(), 12);

    let failure = report.get(PRICING).and_then(EntityOutcome::failure).unwrap();
    assert_eq!(failure.kind, ErrorKind::SourceConnectionFailed);
    assert!(failure.retryable);
    assert_eq!(pricing_calls.connect_attempts(), 3);
    assert_eq!(pricing_calls.closes(), 1);
    assert!(store.records(PRICING).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn entities_failing_mid_run_report_what_they_imported() {
    init_test_tracing();

    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();

    let mut pricing_config = pipeline_config(PRICING, "files", 10);
    pricing_config.context.insert("pricing_type".to_owned(), json!("jobber"));

    let pipelines = vec![
        catalog_pipeline(
            registry.clone(),
            pipeline_config(INVENTORY, "files", 5),
            MockConnector::new(SourceType::File, inventory_rows(12))
                .failing_extract_at(10, ErrorKind::SourceIoError),
            store.clone(),
        )
        .unwrap(),
        catalog_pipeline(
            registry,
            pricing_config,
            MockConnector::new(SourceType::File, pricing_rows()),
            store.clone(),
        )
        .unwrap(),
    ];

    let report = ParallelPipeline::new(pipelines, 2).unwrap().run().await;

    assert_eq!(report.failed_entities(), vec![INVENTORY]);
    assert_eq!(report.failed_after_writes(), vec![INVENTORY]);

    let failure = report.get(INVENTORY).and_then(EntityOutcome::failure).unwrap();
    assert_eq!(failure.kind, ErrorKind::SourceIoError);
    let partial = failure.partial.as_ref().unwrap();
    assert_eq!(partial.created, 10);
    assert!(partial.aborted);
    assert_eq!(store.records(INVENTORY).await.len(), 10);

    let totals = report.totals();
    assert_eq!(totals.created, 12);
    assert!(totals.aborted);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_panicking_worker_is_reported_as_failed() {
    init_test_tracing();

    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();

    let mut pricing_config = pipeline_config(PRICING, "erp", 10);
    pricing_config.context.insert("pricing_type".to_owned(), json!("export"));

    let pipelines = vec![
        catalog_pipeline(
            registry.clone(),
            pipeline_config(INVENTORY, "files", 10),
            MockConnector::new(SourceType::File, inventory_rows(3)),
            store.clone(),
        )
        .unwrap(),
        catalog_pipeline(
            registry,
            pricing_config,
            MockConnector::new(SourceType::File, pricing_rows()).panicking_connect(),
            store.clone(),
        )
        .unwrap(),
    ];

    let report = ParallelPipeline::new(pipelines, 2).unwrap().run().await;

    let failure = report.get(PRICING).and_then(EntityOutcome::failure).unwrap();
    assert_eq!(failure.kind, ErrorKind::PipelineWorkerPanic);
    assert!(!failure.retryable);
    assert_eq!(
        report.get(INVENTORY).and_then(EntityOutcome::result).map(|r| r.created),
        Some(3)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn a_single_worker_runs_every_pipeline() {
    init_test_tracing();

    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();

    let mut pricing_config = pipeline_config(PRICING, "files", 10);
    pricing_config.context.insert("pricing_type".to_owned(), json!("export"));

    let pipelines = vec![
        catalog_pipeline(
            registry.clone(),
            pipeline_config(INVENTORY, "files", 4),
            MockConnector::new(SourceType::File, inventory_rows(9)),
            store.clone(),
        )
        .unwrap(),
        catalog_pipeline(
            registry,
            pricing_config,
            MockConnector::new(SourceType::File, pricing_rows()),
            store.clone(),
        )
        .unwrap(),
    ];

    let report = ParallelPipeline::new(pipelines, 1).unwrap().run().await;

    assert!(!report.has_fatal_failures());
    assert!(report.partial_entities().is_empty());
    assert_eq!(report.totals().created, 11);

    let prices = store.records(PRICING).await;
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0]["price"], json!(12.0));
    assert_eq!(prices[0]["pricing_type"], json!("export"));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_entities_are_rejected() {
    let registry = FieldRegistry::catalog().unwrap();
    let store = MemoryStore::new();

    let pipelines = (0..2)
        .map(|_| {
            catalog_pipeline(
                registry.clone(),
                pipeline_config(INVENTORY, "files", 10),
                MockConnector::new(SourceType::File, Vec::new()),
                store.clone(),
            )
            .unwrap()
        })
        .collect();

    let err = ParallelPipeline::new(pipelines, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

use catalog_config::shared::{FileEncoding, FileSourceConfig};
use catalog_etl::connectors::FileConnector;
use catalog_etl::error::ErrorKind;
use catalog_etl::pipeline::RunOptions;
use catalog_etl::registry::FieldRegistry;
use catalog_etl::registry::catalog::INVENTORY;
use catalog_etl::store::{EntityKey, MemoryStore};
use catalog_etl::test_utils::fixtures::{catalog_pipeline, pipeline_config};
use catalog_telemetry::tracing::init_test_tracing;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

const INVENTORY_CSV: &str = "\
part_number,warehouse,quantity
AB-100 ,east,12
CD-200,,-5
EF-300, west ,N/A
,main,3
";

fn file_source(path: &Path) -> FileSourceConfig {
    FileSourceConfig {
        tables: BTreeMap::from([("INVENTORY".to_owned(), path.to_path_buf())]),
        format: None,
        delimiter: FileSourceConfig::DEFAULT_DELIMITER,
        has_header: true,
        encoding: FileEncoding::Utf8,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn csv_inventory_is_cleaned_and_imported() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.csv");
    std::fs::write(&path, INVENTORY_CSV).unwrap();

    let store = MemoryStore::new();
    let connector = FileConnector::new("files", &file_source(&path)).unwrap();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 2),
        connector,
        store.clone(),
    )
    .unwrap();

    let result = pipeline.run_configured().await.unwrap();

    assert_eq!(result.created, 3);
    assert_eq!(result.errors.len(), 1);

    let record = |part: &str| {
        let store = store.clone();
        let key = EntityKey::new([part]);
        async move { store.get(INVENTORY, &key).await.unwrap() }
    };

    let ab = record("AB-100").await;
    assert_eq!(ab["quantity"], json!(12));
    assert_eq!(ab["warehouse"], json!("EAST"));

    let cd = record("CD-200").await;
    assert_eq!(cd["quantity"], json!(0));
    assert_eq!(cd["warehouse"], json!("MAIN"));

    let ef = record("EF-300").await;
    assert_eq!(ef["quantity"], json!(0));
    assert_eq!(ef["warehouse"], json!("WEST"));

    let rerun = pipeline.run_configured().await.unwrap();
    assert_eq!(rerun.unchanged, 3);
    assert_eq!(rerun.created + rerun.updated, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn queries_on_unlisted_files_are_security_violations() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.csv");
    std::fs::write(&path, INVENTORY_CSV).unwrap();

    let store = MemoryStore::new();
    let connector = FileConnector::new("files", &file_source(&path)).unwrap();
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        pipeline_config(INVENTORY, "files", 10),
        connector,
        store.clone(),
    )
    .unwrap();

    let err = pipeline
        .run(Some("SELECT * FROM CUSTOMERS"), &[], RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
    assert!(store.records(INVENTORY).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_files_fail_on_connect() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let connector =
        FileConnector::new("files", &file_source(&dir.path().join("missing.csv"))).unwrap();
    let mut config = pipeline_config(INVENTORY, "files", 10);
    config.connect_retry.max_attempts = 1;
    let mut pipeline = catalog_pipeline(
        FieldRegistry::catalog().unwrap(),
        config,
        connector,
        MemoryStore::new(),
    )
    .unwrap();

    let err = pipeline.run_configured().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
}

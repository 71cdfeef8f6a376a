use catalog_etl::importer::{Importer, UpsertImporter};
use catalog_etl::registry::FieldRegistry;
use catalog_etl::registry::catalog::{INVENTORY, PRODUCTS};
use catalog_etl::store::{EntityKey, MemoryStore};
use catalog_etl::test_utils::fixtures::row;
use catalog_etl::test_utils::store::FaultyStore;
use catalog_etl::types::Record;
use catalog_telemetry::tracing::init_test_tracing;
use serde_json::json;
use std::time::Duration;

fn inventory_record(n: usize, quantity: i64) -> Record {
    row(json!({
        "part_number": format!("P-{n:05}"),
        "warehouse": "MAIN",
        "quantity": quantity,
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn one_lookup_per_batch_splits_updates_and_creates() {
    init_test_tracing();

    let store = MemoryStore::new();
    for n in (0..1000).step_by(10).chain((5..1000).step_by(10)).chain((3..1000).step_by(10)) {
        store
            .insert(
                INVENTORY,
                EntityKey::new([format!("P-{n:05}")]),
                inventory_record(n, 0),
            )
            .await;
    }
    assert_eq!(store.records(INVENTORY).await.len(), 300);

    let importer = UpsertImporter::new(
        FieldRegistry::catalog().unwrap(),
        store.clone(),
        Duration::from_secs(5),
    );
    let records = (0..1000).map(|n| inventory_record(n, 1)).collect();

    let result = importer.import_data(INVENTORY, records, false).await;

    assert_eq!(store.lookup_count(INVENTORY).await, 1);
    assert_eq!(result.updated, 300);
    assert_eq!(result.created, 700);
    assert_eq!(result.unchanged, 0);
    assert!(result.errors.is_empty());
    assert_eq!(store.records(INVENTORY).await.len(), 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn importing_the_same_batch_twice_is_idempotent() {
    init_test_tracing();

    let store = MemoryStore::new();
    let importer = UpsertImporter::new(
        FieldRegistry::catalog().unwrap(),
        store.clone(),
        Duration::from_secs(5),
    );
    let records: Vec<Record> = (0..50).map(|n| inventory_record(n, n as i64)).collect();

    let first = importer.import_data(INVENTORY, records.clone(), false).await;
    let snapshot = store.records(INVENTORY).await;
    let second = importer.import_data(INVENTORY, records, false).await;

    assert_eq!(first.created, 50);
    assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 50));
    assert_eq!(store.records(INVENTORY).await, snapshot);
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_failures_turn_the_batch_into_record_errors() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    store.fail_lookups(true);
    let importer = UpsertImporter::new(
        FieldRegistry::catalog().unwrap(),
        store.clone(),
        Duration::from_secs(5),
    );

    let result = importer
        .import_data(INVENTORY, vec![inventory_record(1, 1), inventory_record(2, 2)], false)
        .await;

    assert_eq!(result.processed(), 0);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].message.contains("Injected lookup failure"));
    assert!(store.inner().records(INVENTORY).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn write_failures_are_scoped_to_their_record() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    let importer = UpsertImporter::new(
        FieldRegistry::catalog().unwrap(),
        store.clone(),
        Duration::from_secs(5),
    );
    importer
        .import_data(INVENTORY, vec![inventory_record(1, 1)], false)
        .await;

    store.fail_writes(true);
    let result = importer
        .import_data(INVENTORY, vec![inventory_record(1, 5), inventory_record(2, 2)], false)
        .await;

    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.processed(), 0);

    store.fail_writes(false);
    let result = importer
        .import_data(INVENTORY, vec![inventory_record(1, 5), inventory_record(2, 2)], false)
        .await;
    assert_eq!((result.created, result.updated), (1, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_entities_fail_every_record() {
    init_test_tracing();

    let importer = UpsertImporter::new(
        FieldRegistry::catalog().unwrap(),
        MemoryStore::new(),
        Duration::from_secs(5),
    );

    let result = importer
        .import_data("customers", vec![row(json!({"id": 1}))], false)
        .await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("customers"));

    let result = importer
        .import_data(PRODUCTS, vec![row(json!({"description": "no key"}))], false)
        .await;
    assert!(result.errors[0].message.contains("part_number"));
}

//! Error-path tests: every failure must leave the store unchanged, and every
//! absence must stay a normal empty result.

use contabase::{Record, RecordId, Schema, Store, StoreConfig, StoreError, Value};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn people_schema() -> Schema {
    Schema::from_json_value(&json!({
        "name": {"type": "str", "required": true},
        "age": {"type": "int", "required": true},
        "place": {"type": "str", "default": "canada"},
    }))
    .unwrap()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn memory_store() -> Store {
    Store::open(StoreConfig {
        name: "test".to_string(),
        schema: Some(people_schema()),
        in_memory: true,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_open_without_any_schema_fails() {
    let dir = TempDir::new().unwrap();
    let result = Store::open(StoreConfig {
        name: "test".to_string(),
        root: dir.path().to_path_buf(),
        ..Default::default()
    });

    match result {
        Err(StoreError::Schema(message)) => assert!(message.contains("not provided")),
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn test_failed_open_leaves_no_table_snapshot() {
    let dir = TempDir::new().unwrap();
    let _ = Store::open(StoreConfig {
        name: "test".to_string(),
        root: dir.path().to_path_buf(),
        ..Default::default()
    });

    assert!(!dir.path().join("test").join("test.db").exists());
}

#[test]
fn test_corrupt_table_snapshot_fails_open() {
    let dir = TempDir::new().unwrap();

    {
        let mut store = Store::open(StoreConfig {
            name: "test".to_string(),
            root: dir.path().to_path_buf(),
            schema: Some(people_schema()),
            ..Default::default()
        })
        .unwrap();
        store
            .add(vec![record(&[("name", "ab".into()), ("age", 3.into())])])
            .unwrap();
        store.commit().unwrap();
    }

    let snapshot = dir.path().join("test").join("test.db");
    let mut bytes = fs::read(&snapshot).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&snapshot, bytes).unwrap();

    let result = Store::open(StoreConfig {
        name: "test".to_string(),
        root: dir.path().to_path_buf(),
        ..Default::default()
    });
    assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
}

#[test]
fn test_add_failures_do_not_mutate() {
    let mut store = memory_store();
    store
        .add(vec![record(&[("name", "ab".into()), ("age", 3.into())])])
        .unwrap();
    let before = store.raw_snapshot();

    // Unknown field.
    let result = store.add(vec![record(&[
        ("name", "x".into()),
        ("age", 1.into()),
        ("country", "de".into()),
    ])]);
    assert!(matches!(result, Err(StoreError::Data(_))));

    // Missing required field.
    let result = store.add(vec![record(&[("name", "x".into())])]);
    assert!(matches!(result, Err(StoreError::Data(_))));

    // Type mismatch.
    let result = store.add(vec![record(&[("name", "x".into()), ("age", "1".into())])]);
    assert!(matches!(result, Err(StoreError::Data(_))));

    // Duplicate content.
    let result = store.add(vec![record(&[("name", "ab".into()), ("age", 3.into())])]);
    assert!(matches!(result, Err(StoreError::Duplicate(_))));

    assert_eq!(store.raw_snapshot(), before);
}

#[test]
fn test_query_errors_are_distinct_per_cause() {
    let store = memory_store();

    let err = store
        .get_by_query(&record(&[("name", "x".into()), ("age", 3.into())]))
        .unwrap_err();
    assert!(err.to_string().contains("exactly one field"));

    let err = store
        .get_by_query(&record(&[("Age", 3.into())]))
        .unwrap_err();
    assert!(err.to_string().contains("unknown field"));

    let err = store
        .get_by_query(&record(&[("age", "3".into())]))
        .unwrap_err();
    assert!(err.to_string().contains("must be of type int"));
}

#[test]
fn test_update_failure_restores_nothing_partially() {
    let mut store = memory_store();
    store
        .add(vec![
            record(&[("name", "ab".into()), ("age", 3.into())]),
            record(&[
                ("name", "ac".into()),
                ("age", 3.into()),
                ("place", "france".into()),
            ]),
        ])
        .unwrap();
    let before = store.raw_snapshot();

    // The first match ("ab") would re-key cleanly; the second ("ac") then
    // collides with it. The whole batch must roll back.
    let result = store.update_by_query(
        &record(&[("age", 3.into())]),
        &record(&[("name", "same".into()), ("place", "same".into())]),
    );

    assert!(matches!(result, Err(StoreError::Duplicate(_))));
    assert_eq!(store.raw_snapshot(), before);
}

#[test]
fn test_absence_is_not_an_error() {
    let mut store = memory_store();
    store
        .add(vec![record(&[("name", "ab".into()), ("age", 3.into())])])
        .unwrap();

    let missing = RecordId::from("00000000");
    assert!(store.get_by_hash_id(&missing).is_none());
    assert!(!store.delete_by_hash_id(&missing));
    assert!(store
        .update_by_hash_id(&missing, &record(&[("age", 9.into())]))
        .unwrap()
        .is_empty());
    assert!(store
        .delete_by_query(&record(&[("age", 99.into())]))
        .unwrap()
        .is_empty());
    assert!(store
        .get_by_query(&record(&[("age", 99.into())]))
        .unwrap()
        .is_empty());

    assert_eq!(store.len(), 1);
}

#[test]
fn test_invalid_schema_definitions_are_fatal() {
    for definition in [
        json!({"name": {"type": "text"}}),
        json!({"name": {"type": "str", "default": 12}}),
        json!({"name": {"required": true}}),
        json!({"name": {"type": "str", "extra": 1}}),
    ] {
        let schema = Schema::from_json_value(&definition);
        assert!(
            matches!(schema, Err(StoreError::Schema(_))),
            "expected fatal schema error for {definition}"
        );
    }
}

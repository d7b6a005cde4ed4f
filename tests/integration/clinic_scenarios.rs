#![allow(missing_docs)]

use clinicdb::backup::{export_all, import_all, import_json, BackupError};
use clinicdb::storage::{CollectionName, Record, Store, StoreOptions};
use serde_json::{json, Value};
use tempfile::TempDir;

fn keys(records: &[Record], field: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get(field).and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[test]
fn new_patient_then_appointment() {
    let store = Store::open_in_memory();
    store
        .put(
            CollectionName::Patients,
            Record::new().with("id", "p1").with("name", "Ana"),
        )
        .expect("put patient");
    store
        .put(
            CollectionName::Appointments,
            Record::new()
                .with("id", "a1")
                .with("date", "2024-05-01")
                .with("patientId", "p1"),
        )
        .expect("put appointment");

    let hits = store
        .scan_by_index(CollectionName::Appointments, "by_patientId", "p1")
        .expect("scan");
    assert_eq!(keys(&hits, "id"), vec!["a1"]);
}

#[test]
fn reassigning_a_patients_phone() {
    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(dir.path(), StoreOptions::default()).expect("open");
    let ana = |phone: &str| {
        Record::new()
            .with("id", "p1")
            .with("name", "Ana")
            .with("phone", phone)
    };
    store
        .put(CollectionName::Patients, ana("111"))
        .expect("put 111");
    store
        .put(CollectionName::Patients, ana("222"))
        .expect("put 222");

    assert!(store
        .scan_by_index(CollectionName::Patients, "by_phone", "111")
        .expect("scan 111")
        .is_empty());
    let hits = store
        .scan_by_index(CollectionName::Patients, "by_phone", "222")
        .expect("scan 222");
    assert_eq!(keys(&hits, "id"), vec!["p1"]);

    drop(store);
    let store = Store::open(dir.path(), StoreOptions::default()).expect("reopen");
    assert!(store
        .scan_by_index(CollectionName::Patients, "by_phone", "111")
        .expect("scan 111 after reopen")
        .is_empty());
}

#[test]
fn malformed_import_changes_nothing() {
    let store = Store::open_in_memory();
    store
        .put(
            CollectionName::Patients,
            Record::new().with("id", "p1").with("name", "Ana"),
        )
        .expect("put");
    let before = export_all(&store).expect("export before");

    let err = import_all(&store, json!("not-json-shaped")).unwrap_err();
    assert!(matches!(err, BackupError::Malformed(_)));

    let err = import_json(&store, "{ this is not json").unwrap_err();
    assert!(matches!(err, BackupError::Malformed(_)));

    let err = import_all(
        &store,
        json!({
            "settings": [{"key": "a"}],
            "patients": "p2"
        }),
    )
    .unwrap_err();
    assert!(matches!(err, BackupError::Malformed(_)));

    let after = export_all(&store).expect("export after");
    for name in CollectionName::ALL {
        assert_eq!(before.records(name), after.records(name), "{name} changed");
    }
}

#[test]
fn drafts_are_plain_keyed_records() {
    let store = Store::open_in_memory();
    store
        .put(
            CollectionName::Drafts,
            Record::new()
                .with("key", "encounter-form")
                .with("data", json!({"s": "headache"})),
        )
        .expect("save draft");
    store
        .put(
            CollectionName::Drafts,
            Record::new()
                .with("key", "encounter-form")
                .with("data", json!({"s": "headache, 2 days"})),
        )
        .expect("autosave again");
    assert_eq!(store.count(CollectionName::Drafts).expect("count"), 1);
    store
        .delete(CollectionName::Drafts, "encounter-form")
        .expect("discard draft");
    assert!(store
        .get(CollectionName::Drafts, "encounter-form")
        .expect("get")
        .is_none());
}

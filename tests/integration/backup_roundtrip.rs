#![allow(missing_docs)]

use clinicdb::backup::{
    self, export_all, export_all_at, export_json, import_all, import_json, import_snapshot,
    BackupError,
};
use clinicdb::storage::{CollectionName, Record, Store, StoreOptions};
use serde_json::{json, Value};
use tempfile::TempDir;
use time::macros::datetime;

fn seed(store: &Store) {
    let puts = [
        (
            CollectionName::Settings,
            json!({"key": "profile", "value": {"name": "Dr. Reis", "crm": "1234"}}),
        ),
        (
            CollectionName::Settings,
            json!({"key": "focusPatient", "value": "p2"}),
        ),
        (
            CollectionName::Patients,
            json!({"id": "p1", "name": "Ana", "phone": "111", "birth": "1990-02-01"}),
        ),
        (
            CollectionName::Patients,
            json!({"id": "p2", "name": "Bia", "phone": "222"}),
        ),
        (
            CollectionName::Appointments,
            json!({"id": "a1", "date": "2024-05-01", "patientId": "p1", "time": "09:00"}),
        ),
        (
            CollectionName::Encounters,
            json!({"id": "e1", "date": "2024-05-01", "patientId": "p1", "soap": {"s": "ok"}}),
        ),
        (
            CollectionName::Drafts,
            json!({"key": "encounter:p2", "data": {"s": "partial"}}),
        ),
    ];
    for (collection, value) in puts {
        let record = Record::try_from(value).expect("object");
        store.put(collection, record).expect("seed put");
    }
}

fn assert_same_contents(left: &Store, right: &Store) {
    for name in CollectionName::ALL {
        assert_eq!(
            left.scan_all(name).expect("scan left"),
            right.scan_all(name).expect("scan right"),
            "{name} differs"
        );
    }
}

#[test]
fn export_import_round_trip_through_json() {
    let source = Store::open_in_memory();
    seed(&source);
    let text = export_json(&source, true).expect("export");

    let target = Store::open_in_memory();
    let report = import_json(&target, &text).expect("import");
    assert_eq!(report.total(), 7);
    assert_eq!(report.imported[&CollectionName::Settings], 2);
    assert_same_contents(&source, &target);

    let by_patient = target
        .scan_by_index(CollectionName::Encounters, "by_patientId", "p1")
        .expect("scan");
    assert_eq!(by_patient.len(), 1);
}

#[test]
fn round_trip_between_durable_stores() {
    let dir = TempDir::new().expect("tempdir");
    let snapshot = {
        let source = Store::open(dir.path().join("a"), StoreOptions::default()).expect("open a");
        seed(&source);
        export_all(&source).expect("export")
    };

    {
        let target = Store::open(dir.path().join("b"), StoreOptions::default()).expect("open b");
        import_snapshot(&target, snapshot.clone()).expect("import");
    }
    let reopened = Store::open(dir.path().join("b"), StoreOptions::default()).expect("reopen b");
    for name in CollectionName::ALL {
        assert_eq!(reopened.scan_all(name).expect("scan"), snapshot.records(name));
    }
}

#[test]
fn export_document_shape() {
    let store = Store::open_in_memory();
    seed(&store);
    let snapshot = export_all_at(&store, datetime!(2024-05-01 12:00:00 UTC)).expect("export");
    let value = serde_json::to_value(&snapshot).expect("to_value");

    assert_eq!(value["meta"]["app"], json!("clinicdb"));
    assert_eq!(value["meta"]["exportedAt"], json!("2024-05-01T12:00:00.000Z"));
    assert_eq!(value["meta"]["version"], json!(1));
    for name in CollectionName::ALL {
        assert!(value[name.as_str()].is_array(), "{name} missing");
    }
    assert_eq!(value["patients"].as_array().map(Vec::len), Some(2));
}

#[test]
fn import_overwrites_but_never_deletes() {
    let store = Store::open_in_memory();
    seed(&store);
    import_all(
        &store,
        json!({
            "meta": {"app": "clinicdb", "exportedAt": "2024-06-01T00:00:00.000Z", "version": 1},
            "patients": [{"id": "p1", "name": "Ana Souza", "phone": "999"}, {"id": "p9", "name": "Caio"}]
        }),
    )
    .expect("import");

    assert_eq!(store.count(CollectionName::Patients).expect("count"), 3);
    let p1 = store
        .get(CollectionName::Patients, "p1")
        .expect("get")
        .expect("present");
    assert_eq!(p1.get("name"), Some(&json!("Ana Souza")));
    assert!(p1.get("birth").is_none());
    assert!(store
        .scan_by_index(CollectionName::Patients, "by_phone", "111")
        .expect("scan")
        .is_empty());
    assert_eq!(store.count(CollectionName::Appointments).expect("count"), 1);
}

#[test]
fn newer_backup_version_is_rejected_before_writing() {
    let store = Store::open_in_memory();
    let err = import_all(
        &store,
        json!({
            "meta": {"app": "clinicdb", "exportedAt": "2030-01-01T00:00:00.000Z", "version": 2},
            "patients": [{"id": "p1", "name": "Ana"}]
        }),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        BackupError::UnsupportedVersion { found: 2, supported: 1 }
    ));
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 0);
}

#[test]
fn partial_import_stops_at_first_failure() {
    let store = Store::open_in_memory();
    let err = import_all(
        &store,
        json!({
            "settings": [{"key": "a"}, {"key": "b"}],
            "patients": [{"id": "p1"}, {"id": 42}, {"id": "p3"}],
            "encounters": [{"id": "e1"}]
        }),
    )
    .unwrap_err();
    match &err {
        BackupError::PartialImport {
            collection,
            applied,
            total,
            ..
        } => {
            assert_eq!(*collection, CollectionName::Patients);
            assert_eq!(*applied, 1);
            assert_eq!(*total, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.count(CollectionName::Settings).expect("count"), 2);
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 1);
    assert_eq!(store.count(CollectionName::Encounters).expect("count"), 0);
}

#[test]
fn wipe_empties_everything_and_keeps_schemas() {
    let store = Store::open_in_memory();
    seed(&store);
    let report = backup::wipe(&store);
    assert!(report.is_complete());
    assert_eq!(report.cleared, CollectionName::ALL.to_vec());
    for name in CollectionName::ALL {
        assert!(store.scan_all(name).expect("scan").is_empty());
    }

    store
        .put(
            CollectionName::Patients,
            Record::new().with("id", "p1").with("phone", "111"),
        )
        .expect("put after wipe");
    let hits = store
        .scan_by_index(CollectionName::Patients, "by_phone", "111")
        .expect("index still declared");
    assert_eq!(hits.len(), 1);
}

#[test]
fn wipe_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = Store::open(dir.path(), StoreOptions::default()).expect("open");
        seed(&store);
        store.checkpoint().expect("checkpoint");
        backup::wipe(&store).into_result().expect("wipe");
    }
    let store = Store::open(dir.path(), StoreOptions::default()).expect("reopen");
    let total: usize = CollectionName::ALL
        .into_iter()
        .map(|name| store.count(name).expect("count"))
        .sum();
    assert_eq!(total, 0);
}

#[test]
fn export_of_empty_store_has_empty_arrays() {
    let store = Store::open_in_memory();
    let value: Value = serde_json::from_str(&export_json(&store, false).expect("export"))
        .expect("parse");
    for name in CollectionName::ALL {
        assert_eq!(value[name.as_str()], json!([]));
    }
}

fn journal_bytes(store: &Store) -> u64 {
    store
        .stats()
        .expect("stats")
        .journal
        .expect("durable store")
        .size_bytes
}

fn unbounded() -> StoreOptions {
    StoreOptions::default().checkpoint_threshold(0)
}

#[test]
fn wipe_continues_past_a_failing_collection() {
    // Journal room needed to clear settings and patients.
    let scratch = TempDir::new().expect("tempdir");
    let room = {
        let store = Store::open(scratch.path(), unbounded()).expect("open scratch");
        let before = journal_bytes(&store);
        store.clear(CollectionName::Settings).expect("clear");
        store.clear(CollectionName::Patients).expect("clear");
        journal_bytes(&store) - before
    };

    let dir = TempDir::new().expect("tempdir");
    let seeded = {
        let store = Store::open(dir.path(), unbounded()).expect("open");
        seed(&store);
        journal_bytes(&store)
    };

    let store = Store::open(dir.path(), unbounded().capacity_bytes(seeded + room)).expect("reopen");
    let report = backup::wipe(&store);
    assert!(!report.is_complete());
    assert_eq!(
        report.cleared,
        vec![CollectionName::Settings, CollectionName::Patients]
    );
    let failed: Vec<_> = report.failed.iter().map(|(name, _)| *name).collect();
    assert_eq!(
        failed,
        vec![
            CollectionName::Appointments,
            CollectionName::Encounters,
            CollectionName::Drafts
        ]
    );
    assert!(report.failed.iter().all(|(_, err)| err.is_storage_fault()));
    assert_eq!(store.count(CollectionName::Settings).expect("count"), 0);
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 0);
    assert_eq!(store.count(CollectionName::Appointments).expect("count"), 1);
    assert_eq!(store.count(CollectionName::Encounters).expect("count"), 1);
    assert_eq!(store.count(CollectionName::Drafts).expect("count"), 1);

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, clinicdb::StoreError::PartialWipe { .. }));
    drop(store);

    let store = Store::open(dir.path(), unbounded()).expect("reopen after partial wipe");
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 0);
    assert_eq!(store.count(CollectionName::Appointments).expect("count"), 1);
}

#[test]
fn storage_fault_during_import_is_reported_as_partial() {
    let patient = |id: &str| json!({"id": id, "name": "Ana", "phone": "111"});

    // Journal room needed for two patient puts.
    let scratch = TempDir::new().expect("tempdir");
    let (header, room) = {
        let store = Store::open(scratch.path(), unbounded()).expect("open scratch");
        let before = journal_bytes(&store);
        for id in ["p1", "p2"] {
            let record = Record::try_from(patient(id)).expect("object");
            store.put(CollectionName::Patients, record).expect("put");
        }
        (before, journal_bytes(&store) - before)
    };

    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(dir.path(), unbounded().capacity_bytes(header + room)).expect("open");
    let err = import_all(
        &store,
        json!({
            "patients": [patient("p1"), patient("p2"), patient("p3")],
            "drafts": [{"key": "d1"}]
        }),
    )
    .unwrap_err();
    match &err {
        BackupError::PartialImport {
            collection,
            applied,
            total,
            source,
        } => {
            assert_eq!(*collection, CollectionName::Patients);
            assert_eq!(*applied, 2);
            assert_eq!(*total, 3);
            assert!(source.is_storage_fault());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.get(CollectionName::Patients, "p2").expect("get").is_some());
    assert!(store.get(CollectionName::Patients, "p3").expect("get").is_none());
    assert_eq!(store.count(CollectionName::Drafts).expect("count"), 0);
}

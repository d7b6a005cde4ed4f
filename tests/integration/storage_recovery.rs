#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;

use clinicdb::storage::{
    CollectionName, Record, Store, StoreOptions, Synchronous, IMAGE_FILE, JOURNAL_FILE,
};
use clinicdb::StoreError;
use tempfile::TempDir;

fn setting(key: &str, value: &str) -> Record {
    Record::new().with("key", key).with("value", value)
}

fn encounter(id: &str, patient: &str, date: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("patientId", patient)
        .with("date", date)
        .with("note", "follow-up")
}

#[test]
fn reopen_restores_records_and_indexes() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = Store::open(dir.path(), StoreOptions::default()).expect("open");
        store
            .put(CollectionName::Encounters, encounter("e1", "p1", "2024-05-01"))
            .expect("put");
        store
            .put(CollectionName::Encounters, encounter("e2", "p1", "2024-05-03"))
            .expect("put");
        store
            .put(CollectionName::Settings, setting("focusPatient", "p1"))
            .expect("put");
        store.delete(CollectionName::Encounters, "e2").expect("delete");
    }

    let store = Store::open(dir.path(), StoreOptions::default()).expect("reopen");
    let hits = store
        .scan_by_index(CollectionName::Encounters, "by_patientId", "p1")
        .expect("scan");
    assert_eq!(hits, vec![encounter("e1", "p1", "2024-05-01")]);
    assert_eq!(
        store
            .get(CollectionName::Settings, "focusPatient")
            .expect("get"),
        Some(setting("focusPatient", "p1"))
    );
    let journal = store.stats().expect("stats").journal.expect("durable");
    assert_eq!(journal.replayed_frames, 4);
    assert!(!journal.torn_tail);
}

#[test]
fn checkpoint_then_more_writes_survive_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let options = StoreOptions::default().checkpoint_threshold(0);
    {
        let store = Store::open(dir.path(), options.clone()).expect("open");
        store
            .put(CollectionName::Settings, setting("theme", "dark"))
            .expect("put");
        let info = store.checkpoint().expect("checkpoint");
        assert_eq!(info.records, 1);
        assert_eq!(info.frames_folded, 1);
        store
            .put(CollectionName::Settings, setting("theme", "light"))
            .expect("put after checkpoint");
        store
            .clear(CollectionName::Drafts)
            .expect("clear after checkpoint");
    }
    assert!(dir.path().join(IMAGE_FILE).exists());

    let store = Store::open(dir.path(), options).expect("reopen");
    assert_eq!(
        store.get(CollectionName::Settings, "theme").expect("get"),
        Some(setting("theme", "light"))
    );
    let journal = store.stats().expect("stats").journal.expect("durable");
    assert_eq!(journal.replayed_frames, 2);
}

#[test]
fn torn_journal_tail_is_discarded() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = Store::open(
            dir.path(),
            StoreOptions::default().synchronous(Synchronous::Normal),
        )
        .expect("open");
        store
            .put(CollectionName::Settings, setting("a", "1"))
            .expect("put");
        store
            .put(CollectionName::Settings, setting("b", "2"))
            .expect("put");
    }
    {
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .expect("journal");
        file.write_all(&[0x00, 0x00, 0x01, 0x00, 0xde, 0xad])
            .expect("write torn frame");
    }

    let store = Store::open(dir.path(), StoreOptions::default()).expect("reopen");
    assert_eq!(store.count(CollectionName::Settings).expect("count"), 2);
    let journal = store.stats().expect("stats").journal.expect("durable");
    assert!(journal.torn_tail);
    assert_eq!(journal.discarded_bytes, 6);

    store
        .put(CollectionName::Settings, setting("c", "3"))
        .expect("append after recovery");
    drop(store);
    let store = Store::open(dir.path(), StoreOptions::default()).expect("second reopen");
    assert_eq!(store.count(CollectionName::Settings).expect("count"), 3);
}

#[test]
fn damaged_image_is_reported_as_corruption() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = Store::open(dir.path(), StoreOptions::default()).expect("open");
        store
            .put(CollectionName::Settings, setting("a", "1"))
            .expect("put");
        store.checkpoint().expect("checkpoint");
    }
    let image_path = dir.path().join(IMAGE_FILE);
    let mut raw = fs::read(&image_path).expect("read image");
    raw[2] ^= 0xff;
    fs::write(&image_path, raw).expect("write image");

    let err = Store::open(dir.path(), StoreOptions::default())
        .err()
        .expect("open should fail");
    assert!(matches!(err, StoreError::Corruption(_)));
    assert!(err.is_storage_fault());
}

#[test]
fn capacity_fault_leaves_collection_unchanged() {
    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(
        dir.path(),
        StoreOptions::default()
            .checkpoint_threshold(0)
            .capacity_bytes(512),
    )
    .expect("open");

    let mut stored = 0usize;
    let err = loop {
        let record = encounter(&format!("e{stored}"), "p1", "2024-05-01");
        match store.put(CollectionName::Encounters, record) {
            Ok(()) => stored += 1,
            Err(err) => break err,
        }
        assert!(stored < 100, "quota never reached");
    };
    assert!(matches!(err, StoreError::CapacityExceeded { .. }));
    assert_eq!(store.count(CollectionName::Encounters).expect("count"), stored);
    let failed_key = format!("e{stored}");
    assert!(store
        .get(CollectionName::Encounters, &failed_key)
        .expect("get")
        .is_none());
    assert_eq!(
        store
            .scan_by_index(CollectionName::Encounters, "by_date", "2024-05-01")
            .expect("scan")
            .len(),
        stored
    );

    store.checkpoint().expect("checkpoint frees journal space");
    store
        .put(CollectionName::Encounters, encounter(&failed_key, "p1", "2024-05-01"))
        .expect("put after checkpoint");
}

#[test]
fn unsynced_writes_survive_clean_close() {
    let dir = TempDir::new().expect("tempdir");
    let options = StoreOptions::default()
        .synchronous(Synchronous::Off)
        .checkpoint_threshold(0);
    {
        let store = Store::open(dir.path(), options.clone()).expect("open");
        for n in 0..5 {
            store
                .put(CollectionName::Encounters, encounter(&format!("e{n}"), "p1", "2024-05-01"))
                .expect("put");
        }
        store.delete(CollectionName::Encounters, "e0").expect("delete");
    }

    let store = Store::open(dir.path(), options).expect("reopen");
    let hits = store
        .scan_by_index(CollectionName::Encounters, "by_patientId", "p1")
        .expect("scan");
    let ids: Vec<_> = hits
        .iter()
        .filter_map(|record| record.get("id").and_then(|id| id.as_str()))
        .collect();
    assert_eq!(ids, ["e1", "e2", "e3", "e4"]);
}

#[test]
fn incomplete_journal_header_is_recovered() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join(JOURNAL_FILE), b"CLN").expect("write partial header");

    let store = Store::open(dir.path(), StoreOptions::default()).expect("open");
    store
        .put(CollectionName::Settings, setting("theme", "dark"))
        .expect("put");
    drop(store);

    let store = Store::open(dir.path(), StoreOptions::default()).expect("reopen");
    assert_eq!(
        store.get(CollectionName::Settings, "theme").expect("get"),
        Some(setting("theme", "dark"))
    );
}

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use clinicdb::storage::{CollectionName, Record, Store, StoreOptions};
use serde_json::Value;
use tempfile::TempDir;

fn setup_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("clinic");
    seed(&path);
    (dir, path)
}

fn seed(path: &Path) {
    let store = Store::open(path, StoreOptions::default()).expect("open");
    store
        .put(
            CollectionName::Patients,
            Record::new()
                .with("id", "p1")
                .with("name", "Ana")
                .with("phone", "111"),
        )
        .expect("put p1");
    store
        .put(
            CollectionName::Patients,
            Record::new()
                .with("id", "p2")
                .with("name", "Bia")
                .with("phone", "222"),
        )
        .expect("put p2");
    store
        .put(
            CollectionName::Appointments,
            Record::new()
                .with("id", "a1")
                .with("date", "2024-05-01")
                .with("patientId", "p1"),
        )
        .expect("put a1");
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json output")
}

#[test]
fn stats_reports_collections_as_json() {
    let (_dir, db_path) = setup_db();
    let output = cargo_bin_cmd!("clinicdb")
        .args(["--format", "json", "stats"])
        .arg(&db_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = stdout_json(&output);
    let collections = report["store"]["collections"]
        .as_array()
        .expect("collections");
    assert_eq!(collections.len(), 5);
    assert_eq!(collections[1]["name"], "patients");
    assert_eq!(collections[1]["records"], 2);
}

#[test]
fn checkpoint_and_verify_succeed() {
    let (_dir, db_path) = setup_db();
    cargo_bin_cmd!("clinicdb")
        .arg("checkpoint")
        .arg(&db_path)
        .assert()
        .success();
    assert!(db_path.join("clinic.image").exists());

    let output = cargo_bin_cmd!("clinicdb")
        .args(["--format", "json", "verify", "--level", "full"])
        .arg(&db_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = stdout_json(&output);
    assert_eq!(report["success"], true);
    assert_eq!(report["counts"]["records"], 3);
}

#[test]
fn get_and_scan_print_records() {
    let (_dir, db_path) = setup_db();
    let output = cargo_bin_cmd!("clinicdb")
        .args(["--format", "json", "get", "patients", "p2"])
        .arg(&db_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(stdout_json(&output)[0]["name"], "Bia");

    let output = cargo_bin_cmd!("clinicdb")
        .args(["--format", "json", "scan", "appointments"])
        .arg(&db_path)
        .args(["--index", "by_patientId", "--value", "p1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let hits = stdout_json(&output);
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
    assert_eq!(hits[0]["id"], "a1");

    cargo_bin_cmd!("clinicdb")
        .args(["get", "patients", "missing"])
        .arg(&db_path)
        .assert()
        .code(3);
}

#[test]
fn export_wipe_import_restores_records() {
    let (dir, db_path) = setup_db();
    let backup = dir.path().join("backup.json");

    cargo_bin_cmd!("clinicdb")
        .arg("export")
        .arg(&db_path)
        .arg("--output")
        .arg(&backup)
        .assert()
        .success();
    let document: Value =
        serde_json::from_str(&fs::read_to_string(&backup).expect("read backup")).expect("parse");
    assert_eq!(document["meta"]["app"], "clinicdb");
    assert_eq!(document["patients"].as_array().map(Vec::len), Some(2));

    cargo_bin_cmd!("clinicdb")
        .arg("wipe")
        .arg(&db_path)
        .assert()
        .failure();
    cargo_bin_cmd!("clinicdb")
        .arg("wipe")
        .arg(&db_path)
        .arg("--yes")
        .assert()
        .success();
    {
        let store = Store::open(&db_path, StoreOptions::default()).expect("open");
        assert_eq!(store.count(CollectionName::Patients).expect("count"), 0);
    }

    cargo_bin_cmd!("clinicdb")
        .arg("import")
        .arg(&backup)
        .arg(&db_path)
        .assert()
        .success();
    let store = Store::open(&db_path, StoreOptions::default()).expect("reopen");
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 2);
    assert_eq!(store.count(CollectionName::Appointments).expect("count"), 1);
}

#[test]
fn malformed_backup_fails_import() {
    let (dir, db_path) = setup_db();
    let backup = dir.path().join("broken.json");
    fs::write(&backup, "\"not-json-shaped\"").expect("write");
    cargo_bin_cmd!("clinicdb")
        .arg("import")
        .arg(&backup)
        .arg(&db_path)
        .assert()
        .failure();
    let store = Store::open(&db_path, StoreOptions::default()).expect("open");
    assert_eq!(store.count(CollectionName::Patients).expect("count"), 2);
}

#[test]
fn database_path_comes_from_config() {
    let (dir, db_path) = setup_db();
    let config = dir.path().join("cli.toml");
    fs::write(
        &config,
        format!("[database]\ndefault = {:?}\n", db_path.display().to_string()),
    )
    .expect("write config");
    let output = cargo_bin_cmd!("clinicdb")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "get", "settings", "absent"])
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    assert!(output.is_empty());

    cargo_bin_cmd!("clinicdb")
        .env("CLINICDB_CONFIG", &config)
        .args(["--format", "json", "stats"])
        .assert()
        .success();
}

#[test]
fn scan_prints_a_table_in_text_mode() {
    let (_dir, db_path) = setup_db();
    let output = cargo_bin_cmd!("clinicdb")
        .args(["scan", "patients"])
        .arg(&db_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "patients (2 records)");
    assert!(lines[1].starts_with("id"));
    assert!(lines[2].starts_with("p1") && lines[2].contains("Ana"));
    assert!(lines[3].starts_with("p2") && lines[3].contains("222"));
}

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::admin::{open_store, AdminError, AdminOpenOptions};
use crate::backup::{self, backup_file_name, BackupError, ImportReport};
use crate::storage::CollectionName;
use crate::types::StoreError;

/// Configuration for importing a backup file.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Data directory of the target store.
    pub db_path: PathBuf,
    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
    /// Backup file to read.
    pub input: PathBuf,
    /// Clear every collection before importing.
    pub replace: bool,
}

/// Summary of an import operation.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Records written per collection.
    pub report: ImportReport,
}

/// Configuration for exporting a store to a backup file.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Data directory of the source store.
    pub db_path: PathBuf,
    /// Output file. Defaults to `clinic-backup-YYYY-MM-DD.json` in the
    /// current directory.
    pub output: Option<PathBuf>,
    /// Indent the JSON document.
    pub pretty: bool,
}

/// Summary of an export operation.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// File that was written.
    pub path: PathBuf,
    /// Records exported.
    pub records: usize,
    /// Timestamp stamped into the backup.
    pub exported_at: String,
}

/// Error type for CLI import/export operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Backup engine error.
    #[error(transparent)]
    Backup(#[from] BackupError),
    /// Admin operation error.
    #[error(transparent)]
    Admin(#[from] AdminError),
    /// Storage layer error.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Imports a backup file into the store.
///
/// The file is parsed and shape-checked before the store is touched. With
/// `replace` set the store is wiped first; a partial wipe aborts the import.
/// The store is checkpointed after a successful import.
pub fn run_import(cfg: &ImportConfig, opts: &AdminOpenOptions) -> Result<ImportSummary, CliError> {
    let text = fs::read_to_string(&cfg.input)?;
    let document: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
        BackupError::Malformed(format!("{} is not valid JSON: {err}", cfg.input.display()))
    })?;

    let opts = AdminOpenOptions {
        create_if_missing: cfg.create_if_missing,
        ..opts.clone()
    };
    let store = open_store(&cfg.db_path, &opts)?;

    if cfg.replace {
        backup::wipe(&store).into_result()?;
    }
    let report = backup::import_all(&store, document)?;
    store.checkpoint()?;
    info!(
        input = %cfg.input.display(),
        records = report.total(),
        "import finished"
    );
    Ok(ImportSummary { report })
}

/// Exports the store to a backup file, written atomically.
pub fn run_export(cfg: &ExportConfig, opts: &AdminOpenOptions) -> Result<ExportSummary, CliError> {
    let store = open_store(&cfg.db_path, opts)?;
    let now = OffsetDateTime::now_utc();
    let snapshot = backup::export_all_at(&store, now)?;
    let path = match &cfg.output {
        Some(path) => path.clone(),
        None => PathBuf::from(backup_file_name(now.date())?),
    };
    let rendered = if cfg.pretty {
        serde_json::to_vec_pretty(&snapshot)
    } else {
        serde_json::to_vec(&snapshot)
    }
    .map_err(BackupError::Encode)?;
    write_atomically(&path, &rendered)?;

    Ok(ExportSummary {
        path,
        records: snapshot.record_count(),
        exported_at: snapshot.meta.exported_at,
    })
}

/// Record counts of an import, in collection order.
pub fn import_counts(summary: &ImportSummary) -> Vec<(CollectionName, usize)> {
    CollectionName::ALL
        .into_iter()
        .map(|name| {
            let count = summary.report.imported.get(&name).copied().unwrap_or(0);
            (name, count)
        })
        .collect()
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#![forbid(unsafe_code)]

//! Whole-store backup, restore and wipe.
//!
//! The backup engine is a bulk client of the public [`Store`] API: export
//! scans every collection, import issues one `put` per record, and wipe
//! clears each collection in turn.

mod error;
mod snapshot;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::storage::{CollectionName, Store};
use crate::types::StoreError;

pub use error::{BackupError, Result};
pub use snapshot::{backup_file_name, Snapshot, SnapshotMeta, APP_IDENTIFIER};

use snapshot::ImportPlan;

/// Records written per collection by a successful import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Records written, keyed by collection.
    pub imported: BTreeMap<CollectionName, usize>,
}

impl ImportReport {
    /// Records written across all collections.
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

/// Outcome of [`wipe`]: which collections were emptied and which were not.
#[derive(Debug, Default)]
pub struct WipeReport {
    /// Collections now empty.
    pub cleared: Vec<CollectionName>,
    /// Collections that could not be cleared, with the reason.
    pub failed: Vec<(CollectionName, StoreError)>,
}

impl WipeReport {
    /// Whether every collection was cleared.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Converts a partial wipe into [`StoreError::PartialWipe`].
    pub fn into_result(self) -> std::result::Result<Vec<CollectionName>, StoreError> {
        if self.failed.is_empty() {
            return Ok(self.cleared);
        }
        Err(StoreError::PartialWipe {
            cleared: self.cleared.iter().map(|name| name.as_str()).collect(),
            failed: self.failed.iter().map(|(name, _)| name.as_str()).collect(),
        })
    }
}

/// Exports every collection, stamped with the current time.
pub fn export_all(store: &Store) -> Result<Snapshot> {
    export_all_at(store, OffsetDateTime::now_utc())
}

/// Exports every collection, stamped with `at`.
pub fn export_all_at(store: &Store, at: OffsetDateTime) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new(SnapshotMeta::at(at)?);
    for name in CollectionName::ALL {
        *snapshot.records_mut(name) = store.scan_all(name)?;
    }
    info!(
        records = snapshot.record_count(),
        exported_at = %snapshot.meta.exported_at,
        "backup exported"
    );
    Ok(snapshot)
}

/// Renders a fresh export as JSON, indented with two spaces when `pretty`.
pub fn export_json(store: &Store, pretty: bool) -> Result<String> {
    let snapshot = export_all(store)?;
    let rendered = if pretty {
        serde_json::to_string_pretty(&snapshot)
    } else {
        serde_json::to_string(&snapshot)
    };
    rendered.map_err(BackupError::Encode)
}

/// Imports a backup document.
///
/// The shape is validated before anything is written. Records are then put
/// one by one in collection order; existing records with the same key are
/// replaced and records absent from the backup are left alone.
pub fn import_all(store: &Store, document: Value) -> Result<ImportReport> {
    apply(store, ImportPlan::from_value(document)?)
}

/// Imports an already-typed snapshot.
pub fn import_snapshot(store: &Store, snapshot: Snapshot) -> Result<ImportReport> {
    apply(store, ImportPlan::from_snapshot(snapshot)?)
}

/// Parses `text` as JSON and imports it. Unparsable text is a
/// [`BackupError::Malformed`] and writes nothing.
pub fn import_json(store: &Store, text: &str) -> Result<ImportReport> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| BackupError::malformed(format!("not valid JSON: {err}")))?;
    import_all(store, document)
}

fn apply(store: &Store, plan: ImportPlan) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for (collection, records) in plan.collections {
        let total = records.len();
        for (applied, record) in records.into_iter().enumerate() {
            if let Err(source) = store.put(collection, record) {
                warn!(%collection, applied, total, %source, "import stopped");
                return Err(BackupError::PartialImport {
                    collection,
                    applied,
                    total,
                    source,
                });
            }
        }
        report.imported.insert(collection, total);
    }
    info!(records = report.total(), "backup imported");
    Ok(report)
}

/// Removes every record from every collection. Schemas survive.
///
/// Each collection is cleared on its own; a failure on one does not stop the
/// others and is listed in the report.
pub fn wipe(store: &Store) -> WipeReport {
    let mut report = WipeReport::default();
    for name in CollectionName::ALL {
        match store.clear(name) {
            Ok(()) => report.cleared.push(name),
            Err(err) => {
                warn!(collection = %name, %err, "failed to clear collection");
                report.failed.push((name, err));
            }
        }
    }
    info!(
        cleared = report.cleared.len(),
        failed = report.failed.len(),
        "store wiped"
    );
    report
}

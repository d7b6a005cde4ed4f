//! Local persistent storage for a clinical record keeper.
//!
//! Five fixed collections (settings, patients, appointments, encounters and
//! drafts) with secondary indexes, per-operation atomicity over a journaled
//! medium, and whole-store export/import/wipe through a JSON backup document.
//!
//! ```no_run
//! use clinicdb::{CollectionName, Record, Store, StoreOptions};
//!
//! # fn main() -> clinicdb::Result<()> {
//! let store = Store::open("clinic-data", StoreOptions::default())?;
//! store.put(
//!     CollectionName::Patients,
//!     Record::new().with("id", "p1").with("name", "Ana").with("phone", "555-0101"),
//! )?;
//! let hits = store.scan_by_index(CollectionName::Patients, "by_phone", "555-0101")?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod backup;
pub mod cli;
pub mod storage;
pub mod types;

pub use backup::{BackupError, ImportReport, Snapshot, SnapshotMeta, WipeReport};
pub use storage::{CollectionName, Record, Store, StoreHandle, StoreOptions, Synchronous};
pub use types::{Result, StoreError};

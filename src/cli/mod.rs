#![forbid(unsafe_code)]

//! Command-line helpers for moving backups between files and stores.

/// Backup file import and export.
///
/// Reads and writes the JSON backup document used by the export, import and
/// wipe operations of the backup engine.
pub mod import_export;

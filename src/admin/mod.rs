#![forbid(unsafe_code)]

//! Store administration and maintenance utilities.
//!
//! Each entry point opens the store under a data directory, runs one
//! maintenance task and returns a serializable report.

mod checkpoint;
mod error;
mod options;
mod stats;
mod util;
mod verify;

/// Folds the journal into a fresh checkpoint image.
pub use checkpoint::{checkpoint, CheckpointReport};

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Configuration options for opening a store in admin mode.
pub use options::AdminOpenOptions;

/// Statistics collection and reporting.
pub use stats::{stats, FilesystemStats, StatsReport};

/// Store integrity verification.
pub use verify::{
    verify, verify_store, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity,
};

/// Opens a store for administrative commands.
pub use util::open_store;

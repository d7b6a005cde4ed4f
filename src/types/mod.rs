#![forbid(unsafe_code)]

//! Shared error type used across the store.

use std::io;

use thiserror::Error;

/// Result alias used by every storage operation.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the collection store and its durable medium.
///
/// Absent records are never reported through this type: lookups return
/// `Option` and deletes of missing keys are no-ops.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The durable medium could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Persisted data failed validation.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// A write would grow the journal past its configured quota.
    #[error("storage capacity exceeded: {needed} bytes needed, {limit} byte limit")]
    CapacityExceeded {
        /// Journal size the write would have produced.
        needed: u64,
        /// Configured quota.
        limit: u64,
    },
    /// The record cannot be stored in the named collection.
    #[error("invalid record for '{collection}': {reason}")]
    InvalidRecord {
        /// Collection the record was destined for.
        collection: &'static str,
        /// What was wrong with the record.
        reason: String,
    },
    /// The collection does not declare an index with this name.
    #[error("collection '{collection}' has no index named '{index}'")]
    UnknownIndex {
        /// Collection that was queried.
        collection: &'static str,
        /// Requested index name.
        index: String,
    },
    /// No collection with this name exists.
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    /// A wipe cleared only some collections.
    #[error("wipe incomplete: cleared [{}], failed [{}]", cleared.join(", "), failed.join(", "))]
    PartialWipe {
        /// Collections that were emptied.
        cleared: Vec<&'static str>,
        /// Collections that could not be emptied.
        failed: Vec<&'static str>,
    },
    /// The operation was abandoned before completing, e.g. its worker panicked.
    #[error("operation aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    /// Returns `true` when the error originates from the durable medium
    /// (unreachable, full or corrupted) rather than from caller input.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_)
                | StoreError::Corruption(_)
                | StoreError::CapacityExceeded { .. }
                | StoreError::Aborted(_)
        )
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        StoreError::Corruption(message.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corruption(format!("malformed payload: {err}"))
    }
}

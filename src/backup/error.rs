use thiserror::Error;

use crate::storage::CollectionName;
use crate::types::StoreError;

/// Error type for backup export and import.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The input is not a structured backup document. Nothing was written.
    #[error("malformed backup: {0}")]
    Malformed(String),
    /// The backup was produced by a newer schema. Nothing was written.
    #[error("backup schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in `meta.version`.
        found: u64,
        /// Highest version this store reads.
        supported: u32,
    },
    /// A record write failed partway through one collection. Records written
    /// before the failure stay written; later collections were not attempted.
    #[error("import of '{collection}' stopped after {applied} of {total} records: {source}")]
    PartialImport {
        /// Collection being imported when the write failed.
        collection: CollectionName,
        /// Records of that collection written before the failure.
        applied: usize,
        /// Records of that collection present in the backup.
        total: usize,
        /// The failed write.
        #[source]
        source: StoreError,
    },
    /// Reading the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The snapshot could not be rendered as JSON.
    #[error("failed to encode backup: {0}")]
    Encode(#[source] serde_json::Error),
    /// The export timestamp could not be rendered.
    #[error("failed to format export timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Result alias for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

impl BackupError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        BackupError::Malformed(message.into())
    }
}

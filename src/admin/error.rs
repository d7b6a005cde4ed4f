use std::path::{Path, PathBuf};

use crate::backup::BackupError;
use crate::types::StoreError;
use thiserror::Error;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Data directory not found at the specified path.
    #[error("database not found: {0}")]
    MissingDatabase(PathBuf),
    /// Storage engine error.
    #[error(transparent)]
    Core(#[from] StoreError),
    /// Backup engine error.
    #[error(transparent)]
    Backup(#[from] BackupError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_database(path: impl AsRef<Path>) -> Self {
        AdminError::MissingDatabase(path.as_ref().to_path_buf())
    }
}

use std::path::Path;

use serde::Serialize;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::{file_size, open_store};
use crate::admin::Result;
use crate::storage::{StoreStats, IMAGE_FILE, JOURNAL_FILE};

/// Statistics for a store on disk.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Figures reported by the open store.
    pub store: StoreStats,
    /// File sizes on disk.
    pub filesystem: FilesystemStats,
}

/// File-level figures for the data directory.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    /// Data directory.
    pub dir: String,
    /// Journal path.
    pub journal_path: String,
    /// Journal size in bytes.
    pub journal_size_bytes: u64,
    /// Image path.
    pub image_path: String,
    /// Whether a checkpoint image exists.
    pub image_exists: bool,
    /// Image size in bytes, zero when absent.
    pub image_size_bytes: u64,
}

/// Gathers statistics for the store under `path`.
pub fn stats(path: impl AsRef<Path>, opts: &AdminOpenOptions) -> Result<StatsReport> {
    let path = path.as_ref();
    let store = open_store(path, opts)?;
    let store_stats = store.stats()?;

    let journal_path = path.join(JOURNAL_FILE);
    let image_path = path.join(IMAGE_FILE);
    let image_size = file_size(&image_path);
    let filesystem = FilesystemStats {
        dir: path.display().to_string(),
        journal_size_bytes: file_size(&journal_path).unwrap_or(0),
        journal_path: journal_path.display().to_string(),
        image_path: image_path.display().to_string(),
        image_exists: image_size.is_some(),
        image_size_bytes: image_size.unwrap_or(0),
    };

    Ok(StatsReport {
        store: store_stats,
        filesystem,
    })
}

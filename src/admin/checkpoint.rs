use std::path::Path;

use serde::Serialize;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_store;
use crate::admin::Result;

/// Report generated after executing a checkpoint operation.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    /// Records written to the fresh image.
    pub records: usize,
    /// Size of the image in bytes.
    pub image_bytes: u64,
    /// Journal frames folded into the image.
    pub frames_folded: u64,
    /// Duration of the checkpoint operation in milliseconds.
    pub duration_ms: f64,
}

/// Folds the journal of the store under `path` into a fresh image.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the checkpoint fails.
pub fn checkpoint(path: impl AsRef<Path>, opts: &AdminOpenOptions) -> Result<CheckpointReport> {
    let store = open_store(path.as_ref(), opts)?;
    let info = store.checkpoint()?;
    Ok(CheckpointReport {
        records: info.records,
        image_bytes: info.image_bytes,
        frames_folded: info.frames_folded,
        duration_ms: info.duration_ms,
    })
}

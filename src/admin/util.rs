use std::fs;
use std::path::Path;

use crate::storage::Store;

use crate::admin::error::{AdminError, Result};
use crate::admin::options::AdminOpenOptions;

/// Opens the store persisted under `path`.
///
/// # Errors
///
/// Returns an error if the directory doesn't exist and `create_if_missing` is false,
/// or if recovering the image and journal fails.
pub fn open_store(path: &Path, opts: &AdminOpenOptions) -> Result<Store> {
    if !path.exists() {
        if !opts.create_if_missing {
            return Err(AdminError::missing_database(path));
        }
        fs::create_dir_all(path)?;
    }
    Ok(Store::open(path, opts.store_options())?)
}

pub(crate) fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|meta| meta.len())
}

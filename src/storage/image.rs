//! Checkpoint images.
//!
//! An image holds every record of every collection at the time of the last
//! checkpoint: a JSON payload followed by a `[magic "CLNI"][u32 CRC32 BE]`
//! footer covering it. Images are written to a temporary file, fsynced and
//! renamed over the previous image.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::record::Record;
use crate::storage::schema::{CollectionName, SCHEMA_VERSION};
use crate::types::{Result, StoreError};

const IMAGE_CRC_MAGIC: &[u8; 4] = b"CLNI";
const FOOTER_LEN: usize = 8;

/// Serialized contents of a checkpoint image.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Image {
    /// Schema version the image was written with.
    pub version: u32,
    /// Records per collection, in primary key order.
    pub collections: BTreeMap<CollectionName, Vec<Record>>,
}

impl Image {
    /// Empty image at the current schema version.
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            collections: BTreeMap::new(),
        }
    }

    /// Total number of records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Writes `image` to `path` atomically.
pub fn save(image: &Image, path: &Path) -> Result<u64> {
    let payload = serde_json::to_vec(image)?;
    let crc = crc32fast::hash(&payload);

    let mut output = Vec::with_capacity(payload.len() + FOOTER_LEN);
    output.extend_from_slice(&payload);
    output.extend_from_slice(IMAGE_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());

    let tmp_path = path.with_extension("image.tmp");
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&output)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }

    info!(
        path = %path.display(),
        records = image.record_count(),
        bytes = output.len(),
        crc = %format!("{crc:#010x}"),
        "checkpoint image written"
    );
    Ok(output.len() as u64)
}

/// Loads the image at `path`, or `None` when no image has been written yet.
pub fn load(path: &Path) -> Result<Option<Image>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if raw.len() < FOOTER_LEN || &raw[raw.len() - FOOTER_LEN..raw.len() - 4] != IMAGE_CRC_MAGIC {
        return Err(StoreError::corruption(format!(
            "image {} has no checksum footer",
            path.display()
        )));
    }
    let payload = &raw[..raw.len() - FOOTER_LEN];
    let tail = &raw[raw.len() - 4..];
    let stored_crc = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(StoreError::corruption(format!(
            "image crc mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"
        )));
    }

    let image: Image = serde_json::from_slice(payload)?;
    if image.version > SCHEMA_VERSION {
        return Err(StoreError::corruption(format!(
            "image schema version {} is newer than supported version {SCHEMA_VERSION}",
            image.version
        )));
    }
    debug!(path = %path.display(), records = image.record_count(), "checkpoint image loaded");
    Ok(Some(image))
}

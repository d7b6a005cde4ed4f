//! The operation executor.
//!
//! Every collection sits behind its own reader/writer lock: lookups and scans
//! take shared access, mutations take exclusive access. A mutation is written
//! to the journal while the collection's write lock is held and only applied
//! in memory once the append succeeded, so a failed append leaves the
//! collection untouched and readers never see half of an operation.
//!
//! Lock order is always collection lock(s) first, in [`CollectionName::ALL`]
//! order, then the medium. Nothing holding the medium waits on a collection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::collection::Collection;
use crate::storage::image::{self, Image};
use crate::storage::journal::{Journal, JournalEntry, ReplayStats};
use crate::storage::options::StoreOptions;
use crate::storage::record::Record;
use crate::storage::schema::CollectionName;
use crate::types::{Result, StoreError};

/// Journal file name inside the data directory.
pub const JOURNAL_FILE: &str = "clinic.journal";
/// Checkpoint image file name inside the data directory.
pub const IMAGE_FILE: &str = "clinic.image";

struct Durable {
    journal: Journal,
    image_path: PathBuf,
    checkpoints: u64,
    replay: ReplayStats,
}

enum Medium {
    Memory,
    Durable(Mutex<Durable>),
}

/// Summary of a completed checkpoint.
#[derive(Clone, Debug, Serialize)]
pub struct CheckpointInfo {
    /// Records written to the image.
    pub records: usize,
    /// Size of the image file in bytes.
    pub image_bytes: u64,
    /// Journal frames folded into the image.
    pub frames_folded: u64,
    /// Wall time spent, in milliseconds.
    pub duration_ms: f64,
}

/// Per-index figures reported by [`Store::stats`].
#[derive(Clone, Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: &'static str,
    /// Indexed record field.
    pub field: &'static str,
    /// Distinct indexed values.
    pub values: usize,
    /// Total (value, key) postings.
    pub entries: usize,
}

/// Per-collection figures reported by [`Store::stats`].
#[derive(Clone, Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: CollectionName,
    /// Primary key field.
    pub primary_key: &'static str,
    /// Record count.
    pub records: usize,
    /// Declared indexes.
    pub indexes: Vec<IndexStats>,
}

/// Journal figures reported by [`Store::stats`].
#[derive(Clone, Debug, Serialize)]
pub struct JournalSection {
    /// Journal location.
    pub path: String,
    /// Current size in bytes.
    pub size_bytes: u64,
    /// Frames not yet folded into an image.
    pub frames_since_checkpoint: u64,
    /// Frames appended since open.
    pub frames_appended: u64,
    /// fsync calls since open.
    pub syncs: u64,
    /// Checkpoints completed since open.
    pub checkpoints: u64,
    /// Configured quota, if any.
    pub capacity_bytes: Option<u64>,
    /// Frames replayed when the store was opened.
    pub replayed_frames: u64,
    /// Whether the last open discarded a torn or corrupt tail.
    pub torn_tail: bool,
    /// Bytes discarded from that tail.
    pub discarded_bytes: u64,
}

/// Snapshot of store figures.
#[derive(Clone, Debug, Serialize)]
pub struct StoreStats {
    /// Data directory, absent for in-memory stores.
    pub directory: Option<String>,
    /// One entry per collection, in [`CollectionName::ALL`] order.
    pub collections: Vec<CollectionStats>,
    /// Journal figures, absent for in-memory stores.
    pub journal: Option<JournalSection>,
}

/// An open clinical record store.
///
/// Construct one with [`Store::open`] or [`Store::open_in_memory`] and share it
/// (for instance behind an `Arc`) with every caller; there is no global handle.
pub struct Store {
    dir: Option<PathBuf>,
    options: StoreOptions,
    collections: [RwLock<Collection>; 5],
    medium: Medium,
}

impl Store {
    /// Opens (or creates) the store persisted under `dir`, recovering the last
    /// checkpoint image and replaying the journal on top of it.
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            if options.create_if_missing {
                fs::create_dir_all(&dir)?;
            } else {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("data directory {} does not exist", dir.display()),
                )));
            }
        }

        let collections = empty_collections();
        let image_path = dir.join(IMAGE_FILE);
        if let Some(image) = image::load(&image_path)? {
            for (name, records) in image.collections {
                let mut collection = collections[name.slot()].write();
                for record in records {
                    let key = recovered_key(name, &record)?;
                    collection.put(&key, record);
                }
            }
        }

        let (journal, entries, replay) = Journal::open(
            dir.join(JOURNAL_FILE),
            options.synchronous,
            options.capacity_bytes,
        )?;
        for entry in entries {
            apply_recovered(&collections, entry)?;
        }
        let records: usize = collections.iter().map(|c| c.read().len()).sum();
        info!(
            dir = %dir.display(),
            records,
            replayed = replay.frames,
            torn_tail = replay.torn_tail,
            "store opened"
        );

        let store = Self {
            dir: Some(dir),
            options,
            collections,
            medium: Medium::Durable(Mutex::new(Durable {
                journal,
                image_path,
                checkpoints: 0,
                replay,
            })),
        };
        store.maybe_checkpoint();
        Ok(store)
    }

    /// Creates a store that lives only in memory. Nothing survives a drop.
    pub fn open_in_memory() -> Self {
        Self {
            dir: None,
            options: StoreOptions::default(),
            collections: empty_collections(),
            medium: Medium::Memory,
        }
    }

    /// Data directory, or `None` for in-memory stores.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Inserts `record`, or replaces the record with the same primary key.
    ///
    /// Every declared index reflects the new record before this returns.
    pub fn put(&self, collection: CollectionName, record: Record) -> Result<()> {
        let key = record.primary_key(collection)?.to_string();
        {
            let mut guard = self.slot(collection).write();
            self.append(&JournalEntry::Put {
                collection,
                record: record.clone(),
            })?;
            guard.put(&key, record);
        }
        debug!(%collection, key = %key, "put");
        self.maybe_checkpoint();
        Ok(())
    }

    /// Returns the record stored under `key`, or `None` when absent.
    pub fn get(&self, collection: CollectionName, key: &str) -> Result<Option<Record>> {
        Ok(self.slot(collection).read().get(key).cloned())
    }

    /// Removes the record stored under `key`. Deleting an absent key is a no-op.
    pub fn delete(&self, collection: CollectionName, key: &str) -> Result<()> {
        {
            let mut guard = self.slot(collection).write();
            if guard.get(key).is_none() {
                return Ok(());
            }
            self.append(&JournalEntry::Delete {
                collection,
                key: key.to_string(),
            })?;
            guard.delete(key);
        }
        debug!(%collection, key, "delete");
        self.maybe_checkpoint();
        Ok(())
    }

    /// Every record of `collection`, in primary key order.
    pub fn scan_all(&self, collection: CollectionName) -> Result<Vec<Record>> {
        Ok(self.slot(collection).read().scan_all())
    }

    /// Records of `collection` whose field indexed by `index` equals `value`.
    pub fn scan_by_index(
        &self,
        collection: CollectionName,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>> {
        let value = value.into();
        self.slot(collection).read().scan_by_index(index, &value)
    }

    /// Number of records in `collection`.
    pub fn count(&self, collection: CollectionName) -> Result<usize> {
        Ok(self.slot(collection).read().len())
    }

    /// Removes every record of `collection`; its schema is kept.
    pub fn clear(&self, collection: CollectionName) -> Result<()> {
        {
            let mut guard = self.slot(collection).write();
            self.append(&JournalEntry::Clear { collection })?;
            guard.clear();
        }
        info!(%collection, "collection cleared");
        self.maybe_checkpoint();
        Ok(())
    }

    /// Folds the journal into a fresh checkpoint image.
    ///
    /// In-memory stores have nothing to fold and report an empty checkpoint.
    pub fn checkpoint(&self) -> Result<CheckpointInfo> {
        let start = Instant::now();
        let Medium::Durable(medium) = &self.medium else {
            return Ok(CheckpointInfo {
                records: 0,
                image_bytes: 0,
                frames_folded: 0,
                duration_ms: 0.0,
            });
        };

        let guards = self.read_all();
        let mut image = Image::new();
        for guard in &guards {
            image.collections.insert(guard.name(), guard.scan_all());
        }
        let mut durable = medium.lock();
        let frames_folded = durable.journal.frames_since_reset();
        let image_bytes = image::save(&image, &durable.image_path)?;
        durable.journal.reset()?;
        durable.checkpoints += 1;
        drop(durable);
        drop(guards);

        let info = CheckpointInfo {
            records: image.record_count(),
            image_bytes,
            frames_folded,
            duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
        };
        info!(
            records = info.records,
            frames = info.frames_folded,
            "checkpoint complete"
        );
        Ok(info)
    }

    /// Flushes buffered journal frames and fsyncs them.
    pub fn flush(&self) -> Result<()> {
        if let Medium::Durable(medium) = &self.medium {
            medium.lock().journal.sync()?;
        }
        Ok(())
    }

    /// Recomputes every secondary index from the stored records and describes
    /// each divergence. An empty result means all indexes are consistent.
    pub fn verify_indexes(&self) -> Vec<String> {
        self.read_all()
            .iter()
            .flat_map(|guard| guard.check_indexes())
            .collect()
    }

    /// Record counts, index sizes and journal figures.
    pub fn stats(&self) -> Result<StoreStats> {
        let collections = self
            .read_all()
            .iter()
            .map(|guard| -> Result<CollectionStats> {
                let schema = guard.name().schema();
                let indexes = schema
                    .indexes
                    .iter()
                    .map(|def| -> Result<IndexStats> {
                        Ok(IndexStats {
                            name: def.name,
                            field: def.field,
                            values: guard.index_value_count(def.name)?,
                            entries: guard.index_entry_count(def.name)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CollectionStats {
                    name: guard.name(),
                    primary_key: schema.primary_key,
                    records: guard.len(),
                    indexes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let journal = match &self.medium {
            Medium::Memory => None,
            Medium::Durable(medium) => {
                let durable = medium.lock();
                let stats = durable.journal.stats();
                Some(JournalSection {
                    path: durable.journal.path().display().to_string(),
                    size_bytes: durable.journal.len_bytes(),
                    frames_since_checkpoint: durable.journal.frames_since_reset(),
                    frames_appended: stats.frames_appended,
                    syncs: stats.syncs,
                    checkpoints: durable.checkpoints,
                    capacity_bytes: self.options.capacity_bytes,
                    replayed_frames: durable.replay.frames,
                    torn_tail: durable.replay.torn_tail,
                    discarded_bytes: durable.replay.discarded_bytes,
                })
            }
        };

        Ok(StoreStats {
            directory: self.dir.as_ref().map(|dir| dir.display().to_string()),
            collections,
            journal,
        })
    }

    fn slot(&self, collection: CollectionName) -> &RwLock<Collection> {
        &self.collections[collection.slot()]
    }

    fn read_all(&self) -> Vec<RwLockReadGuard<'_, Collection>> {
        self.collections.iter().map(|slot| slot.read()).collect()
    }

    fn append(&self, entry: &JournalEntry) -> Result<()> {
        match &self.medium {
            Medium::Memory => Ok(()),
            Medium::Durable(medium) => medium.lock().journal.append(entry).inspect_err(|err| {
                warn!(collection = %entry.collection(), %err, "journal append failed");
            }),
        }
    }

    /// Runs an automatic checkpoint once enough frames piled up. The write
    /// that triggered it is already durable in the journal, so a failure here
    /// is logged and retried on the next write.
    fn maybe_checkpoint(&self) {
        let threshold = self.options.checkpoint_threshold;
        let Medium::Durable(medium) = &self.medium else {
            return;
        };
        if threshold == 0 || medium.lock().journal.frames_since_reset() < threshold {
            return;
        }
        if let Err(err) = self.checkpoint() {
            warn!(%err, "automatic checkpoint failed");
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(%err, "failed to flush journal on close");
        }
    }
}

fn empty_collections() -> [RwLock<Collection>; 5] {
    CollectionName::ALL.map(|name| RwLock::new(Collection::new(name)))
}

fn recovered_key(collection: CollectionName, record: &Record) -> Result<String> {
    record
        .primary_key(collection)
        .map(str::to_string)
        .map_err(|err| StoreError::corruption(format!("recovered record rejected: {err}")))
}

fn apply_recovered(collections: &[RwLock<Collection>; 5], entry: JournalEntry) -> Result<()> {
    let slot = &collections[entry.collection().slot()];
    match entry {
        JournalEntry::Put { collection, record } => {
            let key = recovered_key(collection, &record)?;
            slot.write().put(&key, record);
        }
        JournalEntry::Delete { key, .. } => {
            slot.write().delete(&key);
        }
        JournalEntry::Clear { .. } => slot.write().clear(),
    }
    Ok(())
}

#![forbid(unsafe_code)]

//! Append-only mutation journal.
//!
//! File layout: a 16-byte header followed by frames
//! `[u32 len BE][u32 crc BE][u64 seq BE][payload]`, where `len` counts the
//! payload bytes and the CRC covers the sequence number and payload. Payloads
//! are JSON-encoded [`JournalEntry`] values.
//!
//! Replay stops at the first truncated or corrupt frame and cuts the file back
//! to the last valid frame so later appends never follow garbage.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::options::Synchronous;
use crate::storage::record::Record;
use crate::storage::schema::CollectionName;
use crate::types::{Result, StoreError};

const JOURNAL_MAGIC: [u8; 4] = *b"CLNJ";
const JOURNAL_FORMAT_VERSION: u16 = 1;
pub(crate) const HEADER_LEN: u64 = 16;
const FRAME_HEADER_LEN: u64 = 16;
const MAX_FRAME_PAYLOAD: u32 = 64 << 20;

/// One journaled mutation. Entries describe resulting state, so replaying an
/// entry twice has the same effect as replaying it once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    /// Insert or replace a record.
    Put {
        /// Target collection.
        collection: CollectionName,
        /// Full record, primary key included.
        record: Record,
    },
    /// Remove a record if present.
    Delete {
        /// Target collection.
        collection: CollectionName,
        /// Primary key.
        key: String,
    },
    /// Remove every record of a collection.
    Clear {
        /// Target collection.
        collection: CollectionName,
    },
}

impl JournalEntry {
    /// Collection the entry applies to.
    pub fn collection(&self) -> CollectionName {
        match self {
            JournalEntry::Put { collection, .. }
            | JournalEntry::Delete { collection, .. }
            | JournalEntry::Clear { collection } => *collection,
        }
    }
}

/// Diagnostics gathered while replaying a journal.
#[derive(Clone, Debug, Default)]
pub struct ReplayStats {
    /// Frames decoded and returned.
    pub frames: u64,
    /// Whether replay ended on a torn or corrupt tail.
    pub torn_tail: bool,
    /// Bytes discarded from the tail.
    pub discarded_bytes: u64,
}

/// Counters describing journal activity since open.
#[derive(Clone, Debug, Default)]
pub struct JournalStats {
    /// Frames appended since open.
    pub frames_appended: u64,
    /// Bytes appended since open.
    pub bytes_appended: u64,
    /// fsync calls issued.
    pub syncs: u64,
    /// Times the journal was reset after a checkpoint.
    pub resets: u64,
}

/// Frames buffered in `Synchronous::Off` mode before they are written out.
const OFF_FLUSH_BYTES: usize = 64 << 10;

/// Append-only journal file.
///
/// Frames accepted but not yet written sit in `pending`. The file holds
/// exactly `flushed_len` bytes of valid frames unless `tail_dirty` is set,
/// in which case the next write truncates back to `flushed_len` first.
pub struct Journal {
    path: PathBuf,
    file: File,
    pending: Vec<u8>,
    flushed_len: u64,
    tail_dirty: bool,
    synchronous: Synchronous,
    capacity_bytes: Option<u64>,
    next_seq: u64,
    frames_since_reset: u64,
    stats: JournalStats,
}

impl Journal {
    /// Opens the journal at `path`, creating it if needed, and returns it
    /// together with the entries it already holds.
    pub fn open(
        path: impl AsRef<Path>,
        synchronous: Synchronous,
        capacity_bytes: Option<u64>,
    ) -> Result<(Self, Vec<JournalEntry>, ReplayStats)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            // No frame can exist yet; a short file is a header write that
            // never completed.
            if file_len > 0 {
                warn!(path = %path.display(), file_len, "rewriting incomplete journal header");
                file.set_len(0)?;
            }
            write_header(&mut file)?;
            file.sync_all()?;
        } else {
            read_header(&mut file)?;
        }

        let (entries, valid_len, last_seq, mut stats) = replay_frames(&mut file)?;
        let total_len = file.metadata()?.len();
        if valid_len < total_len {
            stats.torn_tail = true;
            stats.discarded_bytes = total_len - valid_len;
            warn!(
                path = %path.display(),
                discarded = stats.discarded_bytes,
                "journal tail truncated during recovery"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;
        debug!(path = %path.display(), frames = stats.frames, "journal replayed");

        let journal = Self {
            path,
            file,
            pending: Vec::new(),
            flushed_len: valid_len,
            tail_dirty: false,
            synchronous,
            capacity_bytes,
            next_seq: last_seq + 1,
            frames_since_reset: stats.frames,
            stats: JournalStats::default(),
        };
        Ok((journal, entries, stats))
    }

    /// Appends one entry. On error nothing counts as written: the failed
    /// frame is dropped and frames accepted before it are kept.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let payload = serde_json::to_vec(entry)?;
        let payload_len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_PAYLOAD)
            .ok_or_else(|| StoreError::InvalidRecord {
                collection: entry.collection().as_str(),
                reason: format!("encoded record is {} bytes", payload.len()),
            })?;
        let frame_len = FRAME_HEADER_LEN + u64::from(payload_len);
        if let Some(limit) = self.capacity_bytes {
            let needed = self.len_bytes() + frame_len;
            if needed > limit {
                return Err(StoreError::CapacityExceeded { needed, limit });
            }
        }

        let seq = self.next_seq;
        let mark = self.pending.len();
        self.pending.extend_from_slice(&payload_len.to_be_bytes());
        self.pending
            .extend_from_slice(&frame_crc32(seq, &payload).to_be_bytes());
        self.pending.extend_from_slice(&seq.to_be_bytes());
        self.pending.extend_from_slice(&payload);

        let written = match self.synchronous {
            Synchronous::Off if self.pending.len() < OFF_FLUSH_BYTES => Ok(()),
            Synchronous::Off | Synchronous::Normal => self.write_pending(false),
            Synchronous::Full => self.write_pending(true),
        };
        if let Err(err) = written {
            self.pending.truncate(mark);
            return Err(err.into());
        }

        self.next_seq += 1;
        self.frames_since_reset += 1;
        self.stats.frames_appended += 1;
        self.stats.bytes_appended += frame_len;
        Ok(())
    }

    /// Writes every pending frame at `flushed_len`. `flushed_len` only moves
    /// once the write (and the fsync, when asked for) succeeded; on failure
    /// the file is cut back to it and `pending` is left as it was.
    fn write_pending(&mut self, sync: bool) -> io::Result<()> {
        if self.pending.is_empty() && !sync {
            return Ok(());
        }
        let result = self.write_pending_inner(sync);
        if result.is_err() {
            self.tail_dirty = true;
            if let Err(err) = self.trim_tail() {
                warn!(path = %self.path.display(), %err, "journal tail trim failed");
            }
        }
        result
    }

    fn write_pending_inner(&mut self, sync: bool) -> io::Result<()> {
        self.trim_tail()?;
        self.file.write_all(&self.pending)?;
        if sync {
            self.file.sync_data()?;
            self.stats.syncs += 1;
        }
        self.flushed_len += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    fn trim_tail(&mut self) -> io::Result<()> {
        if self.tail_dirty {
            self.file.set_len(self.flushed_len)?;
            self.file.seek(SeekFrom::Start(self.flushed_len))?;
            self.tail_dirty = false;
        }
        Ok(())
    }

    /// Writes pending frames and fsyncs the file.
    pub fn sync(&mut self) -> Result<()> {
        self.write_pending(false)?;
        self.file.sync_all()?;
        self.stats.syncs += 1;
        Ok(())
    }

    /// Discards every frame, pending ones included, leaving only the header.
    /// Called once a checkpoint image covering all frames is durable.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(HEADER_LEN)?;
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        self.file.sync_all()?;
        self.pending.clear();
        self.flushed_len = HEADER_LEN;
        self.tail_dirty = false;
        self.frames_since_reset = 0;
        self.stats.resets += 1;
        self.stats.syncs += 1;
        debug!(path = %self.path.display(), "journal reset");
        Ok(())
    }

    /// Location of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Journal length in bytes, header and pending frames included.
    pub fn len_bytes(&self) -> u64 {
        self.flushed_len + self.pending.len() as u64
    }

    /// Frames written since the journal was last reset.
    pub fn frames_since_reset(&self) -> u64 {
        self.frames_since_reset
    }

    /// Activity counters since open.
    pub fn stats(&self) -> &JournalStats {
        &self.stats
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(err) = self.write_pending(false) {
            warn!(path = %self.path.display(), %err, "pending journal frames lost on close");
        }
    }
}

fn write_header(file: &mut File) -> io::Result<()> {
    let mut buf = [0u8; HEADER_LEN as usize];
    buf[0..4].copy_from_slice(&JOURNAL_MAGIC);
    buf[4..6].copy_from_slice(&JOURNAL_FORMAT_VERSION.to_be_bytes());
    let crc = crc32fast::hash(&buf[0..12]);
    buf[12..16].copy_from_slice(&crc.to_be_bytes());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buf)
}

fn read_header(file: &mut File) -> Result<()> {
    let mut buf = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => StoreError::corruption("journal header truncated"),
        _ => StoreError::Io(err),
    })?;
    if buf[0..4] != JOURNAL_MAGIC {
        return Err(StoreError::corruption("journal magic mismatch"));
    }
    let version = u16::from_be_bytes([buf[4], buf[5]]);
    if version != JOURNAL_FORMAT_VERSION {
        return Err(StoreError::corruption(format!(
            "journal format version {version} is not supported"
        )));
    }
    if buf[6..12].iter().any(|b| *b != 0) {
        return Err(StoreError::corruption("journal reserved header bytes non-zero"));
    }
    let stored = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
    if crc32fast::hash(&buf[0..12]) != stored {
        return Err(StoreError::corruption("journal header crc mismatch"));
    }
    Ok(())
}

/// CRC32 over the big-endian sequence number followed by the payload, so a
/// frame replayed at the wrong position fails validation.
fn frame_crc32(seq: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&seq.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Reads frames after the header. Returns the decoded entries, the offset just
/// past the last valid frame, and the last sequence number seen.
fn replay_frames(file: &mut File) -> Result<(Vec<JournalEntry>, u64, u64, ReplayStats)> {
    file.seek(SeekFrom::Start(HEADER_LEN))?;
    let mut reader = BufReader::new(&mut *file);
    let mut entries = Vec::new();
    let mut stats = ReplayStats::default();
    let mut offset = HEADER_LEN;
    let mut last_seq = 0u64;
    let mut header = [0u8; FRAME_HEADER_LEN as usize];

    loop {
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let stored_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&header[8..16]);
        let seq = u64::from_be_bytes(seq_bytes);
        if len > MAX_FRAME_PAYLOAD || seq <= last_seq {
            warn!(offset, len, seq, "journal frame header invalid, stopping replay");
            break;
        }
        let mut payload = vec![0u8; len as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "journal truncated mid-frame, stopping replay");
                break;
            }
            Err(err) => return Err(err.into()),
        }
        if frame_crc32(seq, &payload) != stored_crc {
            warn!(offset, seq, "journal frame crc mismatch, stopping replay");
            break;
        }
        let entry: JournalEntry = match serde_json::from_slice(&payload) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(offset, seq, %err, "journal frame undecodable, stopping replay");
                break;
            }
        };
        entries.push(entry);
        stats.frames += 1;
        last_seq = seq;
        offset += FRAME_HEADER_LEN + u64::from(len);
    }

    Ok((entries, offset, last_seq, stats))
}

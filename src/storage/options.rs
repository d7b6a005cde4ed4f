/// Durability mode for journal appends.
///
/// Controls when journal frames reach the disk, trading throughput for
/// durability.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Synchronous {
    /// fsync after every frame (most durable).
    #[default]
    Full,
    /// Hand every frame to the OS without fsync.
    Normal,
    /// Buffer frames in process and write them in batches and on close
    /// (fastest).
    Off,
}

/// Configuration supplied when opening a [`super::Store`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Create the data directory when it does not exist.
    pub create_if_missing: bool,
    /// When journal frames are forced to disk.
    pub synchronous: Synchronous,
    /// Frames since the last checkpoint that trigger an automatic checkpoint.
    /// Zero disables automatic checkpoints.
    pub checkpoint_threshold: u64,
    /// Upper bound for the journal file; appends past it fail as storage faults.
    pub capacity_bytes: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            synchronous: Synchronous::Full,
            checkpoint_threshold: 1000,
            capacity_bytes: None,
        }
    }
}

impl StoreOptions {
    /// Sets whether a missing data directory is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets the synchronous mode.
    pub fn synchronous(mut self, mode: Synchronous) -> Self {
        self.synchronous = mode;
        self
    }

    /// Sets the automatic checkpoint threshold.
    pub fn checkpoint_threshold(mut self, frames: u64) -> Self {
        self.checkpoint_threshold = frames;
        self
    }

    /// Caps the journal size in bytes.
    pub fn capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = Some(bytes);
        self
    }
}

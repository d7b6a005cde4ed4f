use crate::storage::{StoreOptions, Synchronous};

/// Common options used when opening a store for administrative commands.
#[derive(Clone, Debug)]
pub struct AdminOpenOptions {
    /// Durability mode for journal appends.
    pub synchronous: Synchronous,
    /// Journal frames that trigger an automatic checkpoint.
    pub checkpoint_threshold: u64,
    /// Optional journal quota in bytes.
    pub capacity_bytes: Option<u64>,
    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for AdminOpenOptions {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            synchronous: store.synchronous,
            checkpoint_threshold: store.checkpoint_threshold,
            capacity_bytes: store.capacity_bytes,
            create_if_missing: false,
        }
    }
}

impl AdminOpenOptions {
    /// Store options equivalent to these admin options.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            create_if_missing: self.create_if_missing,
            synchronous: self.synchronous,
            checkpoint_threshold: self.checkpoint_threshold,
            capacity_bytes: self.capacity_bytes,
        }
    }
}

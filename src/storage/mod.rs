//! Collection storage engine.
//!
//! Implements the five fixed record collections, their secondary indexes, and
//! the journal/checkpoint machinery that makes every operation durable and
//! atomic.

/// Fixed collection layout: names, primary keys and secondary indexes.
pub mod schema;

/// Append-only mutation journal.
pub mod journal;

/// Checkpoint images folded from the journal.
pub mod image;

mod collection;
mod handle;
mod options;
mod record;
mod store;

/// In-memory collection state with index maintenance.
pub use collection::Collection;

/// Async wrapper for event-driven callers.
pub use handle::StoreHandle;

/// Store configuration.
pub use options::{StoreOptions, Synchronous};

/// Record representation and index keys.
pub use record::{IndexKey, Record};

pub use schema::{CollectionName, CollectionSchema, IndexDef, SCHEMA_VERSION};

/// The operation executor and its reports.
pub use store::{
    CheckpointInfo, CollectionStats, IndexStats, JournalSection, Store, StoreStats, IMAGE_FILE,
    JOURNAL_FILE,
};

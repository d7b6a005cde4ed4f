//! In-memory state of one collection: the primary map plus its index maps.
//!
//! A [`Collection`] never touches the durable medium. The store serializes
//! access to it and journals each mutation before calling in here, so every
//! method below is infallible once its arguments have been validated.

use std::collections::BTreeMap;

use tracing::trace;

use crate::storage::record::{IndexKey, Record};
use crate::storage::schema::{CollectionName, IndexDef};
use crate::types::{Result, StoreError};

/// Postings of one secondary index: index value to primary keys, keys kept in
/// insertion order within each value.
#[derive(Debug)]
struct IndexMap {
    def: &'static IndexDef,
    buckets: BTreeMap<IndexKey, Vec<String>>,
}

impl IndexMap {
    fn new(def: &'static IndexDef) -> Self {
        Self {
            def,
            buckets: BTreeMap::new(),
        }
    }

    fn field(&self) -> &'static str {
        self.def.field
    }

    fn add(&mut self, value: IndexKey, key: &str) {
        self.buckets.entry(value).or_default().push(key.to_string());
    }

    fn remove(&mut self, value: &IndexKey, key: &str) {
        if let Some(keys) = self.buckets.get_mut(value) {
            keys.retain(|existing| existing != key);
            if keys.is_empty() {
                self.buckets.remove(value);
            }
        }
    }

    fn entry_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Records of one collection together with their derived indexes.
#[derive(Debug)]
pub struct Collection {
    name: CollectionName,
    records: BTreeMap<String, Record>,
    indexes: Vec<IndexMap>,
}

impl Collection {
    /// Creates an empty collection with the indexes its schema declares.
    pub fn new(name: CollectionName) -> Self {
        let indexes = name.schema().indexes.iter().map(IndexMap::new).collect();
        Self {
            name,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Which collection this is.
    pub fn name(&self) -> CollectionName {
        self.name
    }

    /// Inserts or replaces `record` under `key`.
    ///
    /// Index entries whose value did not change keep their position; changed
    /// values move the key from the old bucket to the end of the new one.
    pub fn put(&mut self, key: &str, record: Record) {
        let previous = self.records.get(key);
        for index in &mut self.indexes {
            let field = index.field();
            let old_value = previous.and_then(|r| r.index_key(field));
            let new_value = record.index_key(field);
            if old_value == new_value {
                continue;
            }
            if let Some(old) = old_value.as_ref() {
                index.remove(old, key);
            }
            if let Some(new) = new_value {
                index.add(new, key);
            }
        }
        trace!(collection = %self.name, key, "record stored");
        self.records.insert(key.to_string(), record);
    }

    /// Returns the record stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Removes `key` and all of its index entries, returning the old record.
    pub fn delete(&mut self, key: &str) -> Option<Record> {
        let removed = self.records.remove(key)?;
        for index in &mut self.indexes {
            if let Some(value) = removed.index_key(index.field()) {
                index.remove(&value, key);
            }
        }
        trace!(collection = %self.name, key, "record deleted");
        Some(removed)
    }

    /// Drops every record and index entry, keeping the index declarations.
    pub fn clear(&mut self) {
        self.records.clear();
        for index in &mut self.indexes {
            index.buckets.clear();
        }
    }

    /// Clones every record in primary key order.
    pub fn scan_all(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    /// Records whose indexed field equals `value` exactly.
    ///
    /// Values that cannot be indexed (null, booleans, arrays, objects) never
    /// match anything.
    pub fn scan_by_index(&self, index: &str, value: &serde_json::Value) -> Result<Vec<Record>> {
        let map = self.index(index)?;
        let Some(lookup) = IndexKey::from_value(value) else {
            return Ok(Vec::new());
        };
        let keys = map.buckets.get(&lookup).map(Vec::as_slice).unwrap_or(&[]);
        Ok(keys
            .iter()
            .filter_map(|key| self.records.get(key).cloned())
            .collect())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct values present in `index`.
    pub fn index_value_count(&self, index: &str) -> Result<usize> {
        Ok(self.index(index)?.buckets.len())
    }

    /// Number of (value, key) postings in `index`.
    pub fn index_entry_count(&self, index: &str) -> Result<usize> {
        Ok(self.index(index)?.entry_count())
    }

    /// Compares every index against postings recomputed from the records,
    /// returning a description of each mismatch.
    pub fn check_indexes(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for index in &self.indexes {
            let name = index.def.name;
            let mut expected: BTreeMap<IndexKey, Vec<&str>> = BTreeMap::new();
            for (key, record) in &self.records {
                if let Some(value) = record.index_key(index.field()) {
                    expected.entry(value).or_default().push(key);
                }
            }
            for (value, keys) in &index.buckets {
                for key in keys {
                    let live = expected
                        .get(value)
                        .is_some_and(|wanted| wanted.contains(&key.as_str()));
                    if !live {
                        problems.push(format!(
                            "{}.{name}: stale entry {value:?} -> {key}",
                            self.name
                        ));
                    }
                }
            }
            for (value, keys) in &expected {
                let present = index.buckets.get(value);
                for key in keys {
                    if !present.is_some_and(|have| have.iter().any(|k| k == key)) {
                        problems.push(format!(
                            "{}.{name}: missing entry {value:?} -> {key}",
                            self.name
                        ));
                    }
                }
            }
        }
        problems
    }

    fn index(&self, name: &str) -> Result<&IndexMap> {
        self.indexes
            .iter()
            .find(|index| index.def.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                collection: self.name.as_str(),
                index: name.to_string(),
            })
    }
}

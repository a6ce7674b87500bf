//! Copy-on-write snapshot layers.

use std::collections::HashMap;

/// Result of probing one layer for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerLookup<'a> {
    /// The layer records a live value for the key.
    Value(&'a [u8]),
    /// The layer records a tombstone: deleted relative to its predecessor.
    Tombstone,
    /// The layer says nothing about the key; fall through to the layer below.
    Transparent,
}

/// One copy-on-write diff layer in a column's version chain.
///
/// A snapshot holds only the keys written at its chain position. `None`
/// values are tombstones. Position in the chain is tracked by `sequence`;
/// the chain itself lives in the owning column store, so snapshots carry no
/// predecessor/successor links.
#[derive(Debug, Default)]
pub struct Snapshot {
    sequence: u64,
    diff: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Snapshot {
    /// Create an empty layer at the given chain position.
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            diff: HashMap::new(),
        }
    }

    /// Chain position of this layer.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Probe the layer for a key.
    pub fn lookup(&self, key: &[u8]) -> LayerLookup<'_> {
        match self.diff.get(key) {
            Some(Some(value)) => LayerLookup::Value(value),
            Some(None) => LayerLookup::Tombstone,
            None => LayerLookup::Transparent,
        }
    }

    /// Record a write. Last write wins within the layer.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.diff.insert(key, Some(value));
    }

    /// Record a tombstone.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.diff.insert(key, None);
    }

    /// Number of keys touched by this layer.
    pub fn len(&self) -> usize {
        self.diff.len()
    }

    /// Check whether the layer touches no keys.
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// Iterate over the layer's diff entries.
    pub fn entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.diff.iter()
    }

    /// Clone the diff into owned (key, value-or-tombstone) pairs.
    ///
    /// Used by flush to hand the tail's contents to the durable store
    /// without holding the chain lock across the write.
    pub fn to_diff(&self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.diff
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

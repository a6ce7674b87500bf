//! Per-column durable store handles.

use crate::{ColumnFamily, Storage, StorageResult, WriteBatch};
use std::sync::Arc;
use tracing::debug;

/// Durable store for a single data column.
///
/// Binds a shared storage backend to one column family. The versioned state
/// layer owns one of these per snapshot chain and only ever touches its own
/// column through it; everything a chain solidifies lands here.
#[derive(Clone)]
pub struct DurableStore {
    storage: Arc<dyn Storage>,
    column: ColumnFamily,
}

impl DurableStore {
    /// Create a handle for one column of the given backend.
    pub fn new(storage: Arc<dyn Storage>, column: ColumnFamily) -> Self {
        Self { storage, column }
    }

    /// The column this handle is bound to.
    pub fn column(&self) -> ColumnFamily {
        self.column
    }

    /// The column name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.column.name()
    }

    /// Get a value by key.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.storage.get(self.column, key)
    }

    /// Put a key-value pair.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.storage.put(self.column, key, value)
    }

    /// Delete a key.
    pub fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.storage.delete(self.column, key)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        self.storage.contains(self.column, key)
    }

    /// Apply a snapshot diff as one atomic batch.
    ///
    /// `Some(value)` entries become puts, `None` entries (tombstones) become
    /// deletes. The batch is durable when this returns.
    pub fn write_diff(
        &self,
        entries: impl IntoIterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
    ) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for (key, value) in entries {
            match value {
                Some(value) => batch.put(self.column, key, value),
                None => batch.delete(self.column, key),
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        debug!(
            column = self.name(),
            operations = batch.len(),
            "Writing diff to durable store"
        );
        self.storage.write_batch(batch)
    }

    /// Iterate over all entries in the column.
    pub fn iter(&self) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        self.storage.iter(self.column)
    }

    /// Count the entries in the column.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.storage.iter(self.column)?.count())
    }

    /// Check if the column is empty.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.storage.iter(self.column)?.next().is_none())
    }

    /// Delete every entry in the column.
    ///
    /// Used for full resync and for preparing backup targets.
    pub fn clear(&self) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for (key, _) in self.storage.iter(self.column)? {
            batch.delete(self.column, key);
        }

        if !batch.is_empty() {
            debug!(
                column = self.name(),
                removed = batch.len(),
                "Clearing durable column"
            );
            self.storage.write_batch(batch)?;
        }
        Ok(())
    }
}

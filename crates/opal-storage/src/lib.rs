//! # opal-storage
//!
//! Durable storage layer for the Opal node.
//!
//! This crate provides a RocksDB-based storage abstraction with support for:
//! - Column families, one per ledger data column (accounts, contracts, ...)
//! - Atomic batch writes
//! - Per-column durable store handles consumed by the versioned state layer
//!
//! ## Column Families
//!
//! - `Accounts`: account records indexed by address
//! - `Contracts`: deployed contract records indexed by contract address
//! - `ContractStorage`: contract storage rows indexed by (contract, slot)
//! - `Votes`: vote records indexed by voter address
//! - `Witnesses`: witness records indexed by witness address
//! - `Receipts`: transaction receipts indexed by transaction id
//! - `Properties`: chain-wide dynamic properties
//! - `Metadata`: node metadata and configuration

mod batch;
mod database;
mod durable;
mod error;

pub use batch::WriteBatch;
pub use database::{ColumnFamily, Database};
pub use durable::DurableStore;
pub use error::{StorageError, StorageResult};

/// Storage trait for abstracting database operations.
///
/// This allows for easy testing with mock implementations.
pub trait Storage: Send + Sync {
    /// Get a value by key from a column family.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair into a column family.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key from a column family.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()>;

    /// Check if a key exists in a column family.
    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Create an iterator over a column family.
    fn iter(&self, cf: ColumnFamily) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    /// Get multiple values by keys from a column family.
    fn multi_get(&self, cf: ColumnFamily, keys: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(cf, k)).collect()
    }
}

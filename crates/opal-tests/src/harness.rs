//! Test harness for integration tests.
//!
//! Provides utilities for creating test databases and fully-wired ledgers
//! (checkpoint manager over every data column).

use opal_state::CheckpointManager;
use opal_storage::{ColumnFamily, Database, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Test database wrapper that cleans up on drop.
pub struct TestDatabase {
    db: Database,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database in a temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open database");
        Self {
            db,
            _temp_dir: temp_dir,
        }
    }

    /// Get the path to the database.
    pub fn path(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get a clone of the database (shares underlying connection).
    pub fn db_clone(&self) -> Database {
        self.db.clone()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// A checkpoint manager wired over every data column of a test database.
pub struct TestLedger {
    /// The manager under test.
    pub manager: Arc<CheckpointManager>,
    /// The backing database.
    pub db: TestDatabase,
}

impl TestLedger {
    /// Create a fresh ledger over a temporary database.
    pub fn new() -> Self {
        let db = TestDatabase::new();
        let storage: Arc<dyn Storage> = Arc::new(db.db_clone());
        let manager = Arc::new(CheckpointManager::for_columns(
            storage,
            ColumnFamily::data_columns(),
        ));
        Self { manager, db }
    }

    /// Apply one block's worth of writes as a committed checkpoint.
    pub fn apply_block(&self, writes: &[(ColumnFamily, &[u8], &[u8])]) {
        self.manager.open_checkpoint().unwrap();
        for (column, key, value) in writes {
            self.manager
                .put(*column, key.to_vec(), value.to_vec())
                .unwrap();
        }
        self.manager.commit_checkpoint().unwrap();
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}

//! Checkpoint manager coordinating all revoking column stores.

use crate::{RevokingColumnStore, StateError, StateResult};
use opal_storage::{ColumnFamily, DurableStore, Storage};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coordinates every registered column store as one transactional unit.
///
/// A checkpoint is one block's worth of state changes: opening it advances
/// every column in lockstep, reverting it revokes every column in lockstep.
/// Columns know nothing about each other; the manager's only state beyond
/// the registry is whether a checkpoint is currently open. At most one
/// checkpoint may be open at a time.
pub struct CheckpointManager {
    columns: Vec<Arc<RevokingColumnStore>>,
    open: Mutex<bool>,
}

impl CheckpointManager {
    /// Create a manager with an empty registry.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            open: Mutex::new(false),
        }
    }

    /// Create a manager with one column store per listed column family,
    /// all sharing the given storage backend.
    pub fn for_columns(storage: Arc<dyn Storage>, columns: &[ColumnFamily]) -> Self {
        let columns = columns
            .iter()
            .map(|&cf| {
                Arc::new(RevokingColumnStore::new(DurableStore::new(
                    Arc::clone(&storage),
                    cf,
                )))
            })
            .collect();

        Self {
            columns,
            open: Mutex::new(false),
        }
    }

    /// Register a column store. Must be called before the first checkpoint
    /// opens; registration is not supported mid-history.
    pub fn register(&mut self, store: Arc<RevokingColumnStore>) {
        self.columns.push(store);
    }

    /// The registered column stores, in registration order.
    pub fn columns(&self) -> &[Arc<RevokingColumnStore>] {
        &self.columns
    }

    /// Look up a registered column store.
    pub fn column(&self, column: ColumnFamily) -> StateResult<&Arc<RevokingColumnStore>> {
        self.columns
            .iter()
            .find(|store| store.durable().column() == column)
            .ok_or_else(|| StateError::UnknownColumn(column.name().to_string()))
    }

    /// Read a key through a column's chain.
    pub fn get(&self, column: ColumnFamily, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        self.column(column)?.get(key)
    }

    /// Write a key into a column's open checkpoint layer.
    pub fn put(&self, column: ColumnFamily, key: Vec<u8>, value: Vec<u8>) -> StateResult<()> {
        self.column(column)?.put(key, value)
    }

    /// Delete a key in a column's open checkpoint layer.
    pub fn delete(&self, column: ColumnFamily, key: Vec<u8>) -> StateResult<()> {
        self.column(column)?.delete(key)
    }

    /// Whether a checkpoint is currently open.
    pub fn is_checkpoint_open(&self) -> bool {
        *self.open.lock()
    }

    /// Chain depth, identical across columns by the depth-sync invariant.
    pub fn depth(&self) -> usize {
        self.columns.first().map(|c| c.depth()).unwrap_or(0)
    }

    /// Head sequence, identical across columns by the depth-sync invariant.
    pub fn head_sequence(&self) -> Option<u64> {
        self.columns.first().and_then(|c| c.head_sequence())
    }

    /// Open a checkpoint: advance every column in lockstep.
    ///
    /// All-or-nothing: if any column fails to advance, or reports a
    /// sequence diverging from the others, the columns already advanced are
    /// rolled back before the error is returned. Returns the checkpoint
    /// sequence.
    pub fn open_checkpoint(&self) -> StateResult<u64> {
        let mut open = self.open.lock();
        if *open {
            return Err(StateError::CheckpointAlreadyOpen);
        }

        let mut advanced: Vec<&Arc<RevokingColumnStore>> = Vec::with_capacity(self.columns.len());
        let mut expected: Option<u64> = None;

        for column in &self.columns {
            match column.advance() {
                Ok(sequence) => {
                    match expected {
                        None => expected = Some(sequence),
                        Some(e) if e == sequence => {}
                        Some(e) => {
                            let _ = column.revoke();
                            Self::rollback_advanced(&advanced);
                            return Err(StateError::Desync {
                                column: column.name(),
                                expected: Some(e),
                                found: Some(sequence),
                            });
                        }
                    }
                    advanced.push(column);
                }
                Err(err) => {
                    Self::rollback_advanced(&advanced);
                    return Err(err);
                }
            }
        }

        let sequence = expected.unwrap_or(0);
        *open = true;

        debug!(sequence, columns = self.columns.len(), "Checkpoint opened");
        Ok(sequence)
    }

    /// Close the open checkpoint, leaving its layers in place as history.
    ///
    /// Flushes nothing; the layers become eligible for `flush_oldest` once
    /// deeper than the retention window.
    pub fn commit_checkpoint(&self) -> StateResult<()> {
        let mut open = self.open.lock();
        if !*open {
            return Err(StateError::NoOpenCheckpoint);
        }
        *open = false;

        debug!(sequence = self.head_sequence(), "Checkpoint committed");
        Ok(())
    }

    /// Discard the head checkpoint of every column in lockstep.
    ///
    /// Works on an open checkpoint (aborting an in-progress block) and on
    /// the committed head (undoing an applied block on a fork switch). The
    /// checkpoint below, if any, becomes the new head and stays closed.
    pub fn revert_checkpoint(&self) -> StateResult<()> {
        let mut open = self.open.lock();

        if self.columns.is_empty() {
            if !*open {
                return Err(StateError::NoOpenCheckpoint);
            }
            *open = false;
            return Ok(());
        }

        let expected = self.columns[0].head_sequence();
        if expected.is_none() {
            return Err(StateError::NoOpenCheckpoint);
        }
        for column in &self.columns {
            let found = column.head_sequence();
            if found != expected {
                return Err(StateError::Desync {
                    column: column.name(),
                    expected,
                    found,
                });
            }
        }

        for column in &self.columns {
            column.revoke()?;
        }
        *open = false;

        info!(sequence = expected, "Checkpoint reverted");
        Ok(())
    }

    /// Open a checkpoint guarded by an RAII handle.
    ///
    /// Dropping the guard without calling [`CheckpointGuard::commit`]
    /// reverts the checkpoint, so an aborted block cannot leak a mutable
    /// head layer.
    pub fn checkpoint(&self) -> StateResult<CheckpointGuard<'_>> {
        let sequence = self.open_checkpoint()?;
        Ok(CheckpointGuard {
            manager: self,
            sequence,
            committed: false,
        })
    }

    /// Flush the oldest checkpoints until at most `retain` layers remain.
    ///
    /// Every round first verifies that all columns agree on the tail
    /// sequence and depth; divergence means the depth-sync invariant broke
    /// and is fatal. While a checkpoint is open the mutable head is never
    /// flushed, whatever `retain` says. Returns the number of checkpoints
    /// flushed per column.
    pub fn flush_oldest(&self, retain: usize) -> StateResult<usize> {
        let open = self.open.lock();
        let floor = if *open { retain.max(1) } else { retain };

        let mut rounds = 0;
        loop {
            let Some(first) = self.columns.first() else {
                break;
            };
            let depth = first.depth();
            if depth <= floor {
                break;
            }

            let expected = first.tail_sequence();
            for column in &self.columns {
                let found = column.tail_sequence();
                if found != expected || column.depth() != depth {
                    return Err(StateError::Desync {
                        column: column.name(),
                        expected,
                        found,
                    });
                }
            }

            for column in &self.columns {
                column.flush()?;
            }
            rounds += 1;
        }

        if rounds > 0 {
            info!(
                flushed = rounds,
                remaining = self.depth(),
                "Solidified oldest checkpoints"
            );
        }
        Ok(rounds)
    }
}

impl CheckpointManager {
    /// Undo a partially-opened checkpoint. In-memory only, so errors here
    /// are impossible in practice and ignored.
    fn rollback_advanced(advanced: &[&Arc<RevokingColumnStore>]) {
        for column in advanced.iter().rev() {
            let _ = column.revoke();
        }
    }
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle for an open checkpoint.
///
/// Reverts the checkpoint on drop unless committed.
pub struct CheckpointGuard<'a> {
    manager: &'a CheckpointManager,
    sequence: u64,
    committed: bool,
}

impl CheckpointGuard<'_> {
    /// The checkpoint's sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Commit the checkpoint, consuming the guard.
    pub fn commit(mut self) -> StateResult<()> {
        self.manager.commit_checkpoint()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for CheckpointGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(err) = self.manager.revert_checkpoint() {
                warn!(
                    sequence = self.sequence,
                    error = %err,
                    "Failed to revert checkpoint on drop"
                );
            }
        }
    }
}

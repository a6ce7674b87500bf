//! Revoking column store: the snapshot chain for one data column.

use crate::snapshot::{LayerLookup, Snapshot};
use crate::{StateError, StateResult};
use opal_storage::DurableStore;
use parking_lot::RwLock;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info};

/// Owns the chain of snapshot layers for one data column.
///
/// The chain is ordered oldest (front) to newest (back); only the back
/// layer — the head — is mutable. Reads fall through the chain from head to
/// tail and finally to the durable store. Structural mutation (`advance`,
/// `revoke`, `flush`) is driven exclusively by the checkpoint manager so
/// that every column's chain stays depth-synchronized.
pub struct RevokingColumnStore {
    durable: DurableStore,
    chain: RwLock<VecDeque<Snapshot>>,
}

impl RevokingColumnStore {
    /// Create a store with an empty chain over the given durable column.
    pub fn new(durable: DurableStore) -> Self {
        Self {
            durable,
            chain: RwLock::new(VecDeque::new()),
        }
    }

    /// The column name, for diagnostics and error reporting.
    pub fn name(&self) -> &'static str {
        self.durable.name()
    }

    /// The durable store beneath the chain.
    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    /// Read a key through the chain.
    ///
    /// Searches head to tail; the first layer recording the key decides the
    /// result (a tombstone reads as not-found). Keys no layer records are
    /// delegated to the durable store.
    pub fn get(&self, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        {
            let chain = self.chain.read();
            for snapshot in chain.iter().rev() {
                match snapshot.lookup(key) {
                    LayerLookup::Value(value) => return Ok(Some(value.to_vec())),
                    LayerLookup::Tombstone => return Ok(None),
                    LayerLookup::Transparent => {}
                }
            }
        }
        Ok(self.durable.get(key)?)
    }

    /// Write a key into the head layer.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StateResult<()> {
        let mut chain = self.chain.write();
        let head = chain
            .back_mut()
            .ok_or(StateError::NoActiveLayer(self.name()))?;
        head.put(key, value);
        Ok(())
    }

    /// Write a tombstone into the head layer.
    pub fn delete(&self, key: Vec<u8>) -> StateResult<()> {
        let mut chain = self.chain.write();
        let head = chain
            .back_mut()
            .ok_or(StateError::NoActiveLayer(self.name()))?;
        head.delete(key);
        Ok(())
    }

    /// Push a new empty layer on top of the chain.
    ///
    /// The old head becomes immutable. Returns the new head's sequence:
    /// old head + 1, or 0 on an empty chain.
    pub fn advance(&self) -> StateResult<u64> {
        let mut chain = self.chain.write();
        let sequence = chain.back().map(|head| head.sequence() + 1).unwrap_or(0);
        chain.push_back(Snapshot::new(sequence));

        debug!(column = self.name(), sequence, "Layer advanced");
        Ok(sequence)
    }

    /// Discard the head layer and all of its writes.
    ///
    /// Never touches the durable store, so this is always safe: cost is
    /// O(size of the discarded diff).
    pub fn revoke(&self) -> StateResult<u64> {
        let mut chain = self.chain.write();
        let head = chain
            .pop_back()
            .ok_or(StateError::NothingToRevoke(self.name()))?;

        debug!(
            column = self.name(),
            sequence = head.sequence(),
            discarded = head.len(),
            "Layer revoked"
        );
        Ok(head.sequence())
    }

    /// Solidify the tail layer into the durable store.
    ///
    /// The tail's diff is applied as one atomic batch (tombstones become
    /// deletes). The tail stays in the chain until the batch is durable, so
    /// concurrent readers see the same merged view throughout; the chain
    /// lock is only held for the diff copy and the final O(1) unlink, never
    /// across the durable write.
    pub fn flush(&self) -> StateResult<u64> {
        let (sequence, diff) = {
            let chain = self.chain.read();
            let tail = chain
                .front()
                .ok_or(StateError::NothingToFlush(self.name()))?;
            (tail.sequence(), tail.to_diff())
        };

        let entries = diff.len();
        self.durable
            .write_diff(diff)
            .map_err(|source| StateError::DurableWrite {
                column: self.name(),
                source,
            })?;

        self.chain.write().pop_front();

        debug!(
            column = self.name(),
            sequence, entries, "Layer flushed to durable store"
        );
        Ok(sequence)
    }

    /// Number of in-memory layers.
    pub fn depth(&self) -> usize {
        self.chain.read().len()
    }

    /// Sequence of the newest layer, if any.
    pub fn head_sequence(&self) -> Option<u64> {
        self.chain.read().back().map(Snapshot::sequence)
    }

    /// Sequence of the oldest layer, if any.
    pub fn tail_sequence(&self) -> Option<u64> {
        self.chain.read().front().map(Snapshot::sequence)
    }

    /// Total live key count in the merged view (chain plus durable store).
    ///
    /// Diagnostic only: reconciles bottom-up, so cost is proportional to
    /// the durable column size.
    pub fn size(&self) -> StateResult<usize> {
        let mut live: BTreeSet<Vec<u8>> = self
            .durable
            .iter()?
            .map(|(key, _)| key)
            .collect();

        let chain = self.chain.read();
        for snapshot in chain.iter() {
            for (key, value) in snapshot.entries() {
                match value {
                    Some(_) => {
                        live.insert(key.clone());
                    }
                    None => {
                        live.remove(key);
                    }
                }
            }
        }

        Ok(live.len())
    }

    /// Destroy all durable state for this column.
    ///
    /// Used for full resync. Refused while any snapshot layer exists: a
    /// checkpoint in flight must be reverted or flushed first.
    pub fn reset(&self) -> StateResult<()> {
        let chain = self.chain.write();
        if !chain.is_empty() {
            return Err(StateError::ResetWithActiveLayers(self.name()));
        }

        self.durable.clear()?;
        info!(column = self.name(), "Column reset");
        Ok(())
    }
}

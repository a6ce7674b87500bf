//! Block lifecycle integration tests.
//!
//! Exercises the checkpoint manager across every data column over a real
//! RocksDB backend: apply, revert, fork switch, retention flush, and
//! restart recovery.

use crate::harness::*;
use opal_state::{CheckpointManager, StateError};
use opal_storage::{ColumnFamily, Database, Storage};
use std::sync::Arc;

// ============================================================================
// Block Apply / Revert
// ============================================================================

#[test]
fn test_block_writes_span_columns() {
    let ledger = TestLedger::new();

    ledger.apply_block(&[
        (ColumnFamily::Accounts, b"alice", b"100"),
        (ColumnFamily::Votes, b"alice", b"witness-7"),
        (ColumnFamily::Receipts, b"tx-1", b"success"),
    ]);

    let m = &ledger.manager;
    assert_eq!(
        m.get(ColumnFamily::Accounts, b"alice").unwrap(),
        Some(b"100".to_vec())
    );
    assert_eq!(
        m.get(ColumnFamily::Votes, b"alice").unwrap(),
        Some(b"witness-7".to_vec())
    );
    assert_eq!(
        m.get(ColumnFamily::Receipts, b"tx-1").unwrap(),
        Some(b"success".to_vec())
    );
}

#[test]
fn test_reverted_block_touches_no_column() {
    let ledger = TestLedger::new();
    ledger.apply_block(&[(ColumnFamily::Accounts, b"alice", b"100")]);

    let m = &ledger.manager;
    m.open_checkpoint().unwrap();
    m.put(ColumnFamily::Accounts, b"alice".to_vec(), b"0".to_vec())
        .unwrap();
    m.put(ColumnFamily::Accounts, b"bob".to_vec(), b"100".to_vec())
        .unwrap();
    m.put(ColumnFamily::Receipts, b"tx-2".to_vec(), b"transfer".to_vec())
        .unwrap();
    m.revert_checkpoint().unwrap();

    assert_eq!(
        m.get(ColumnFamily::Accounts, b"alice").unwrap(),
        Some(b"100".to_vec())
    );
    assert_eq!(m.get(ColumnFamily::Accounts, b"bob").unwrap(), None);
    assert_eq!(m.get(ColumnFamily::Receipts, b"tx-2").unwrap(), None);
}

#[test]
fn test_fork_switch_pops_applied_blocks() {
    let ledger = TestLedger::new();

    // Blocks 1..=3 apply on the losing branch.
    for i in 1u8..=3 {
        ledger.apply_block(&[
            (ColumnFamily::Accounts, b"alice", &[i]),
            (ColumnFamily::Properties, b"height", &[i]),
        ]);
    }

    let m = &ledger.manager;
    assert_eq!(m.depth(), 3);

    // The competing branch wins at height 1: pop blocks 3 and 2.
    m.revert_checkpoint().unwrap();
    m.revert_checkpoint().unwrap();

    assert_eq!(
        m.get(ColumnFamily::Accounts, b"alice").unwrap(),
        Some(vec![1])
    );
    assert_eq!(
        m.get(ColumnFamily::Properties, b"height").unwrap(),
        Some(vec![1])
    );

    // Apply the winning branch's block 2.
    ledger.apply_block(&[
        (ColumnFamily::Accounts, b"alice", b"fork"),
        (ColumnFamily::Properties, b"height", &[2]),
    ]);
    assert_eq!(
        m.get(ColumnFamily::Accounts, b"alice").unwrap(),
        Some(b"fork".to_vec())
    );
}

// ============================================================================
// Retention Flush
// ============================================================================

#[test]
fn test_flush_retention_preserves_reads() {
    let ledger = TestLedger::new();

    for i in 0u8..5 {
        ledger.apply_block(&[
            (ColumnFamily::Accounts, &[i], &[i + 100]),
            (ColumnFamily::Receipts, &[i], &[i + 200]),
        ]);
    }

    let m = &ledger.manager;
    assert_eq!(m.depth(), 5);

    let flushed = m.flush_oldest(2).unwrap();
    assert_eq!(flushed, 3);
    assert_eq!(m.depth(), 2);

    for i in 0u8..5 {
        assert_eq!(
            m.get(ColumnFamily::Accounts, &[i]).unwrap(),
            Some(vec![i + 100])
        );
        assert_eq!(
            m.get(ColumnFamily::Receipts, &[i]).unwrap(),
            Some(vec![i + 200])
        );
    }

    // The flushed blocks are durable; the retained ones are not yet.
    let db = ledger.db.db();
    assert_eq!(
        db.get(ColumnFamily::Accounts, &[0]).unwrap(),
        Some(vec![100])
    );
    assert_eq!(db.get(ColumnFamily::Accounts, &[4]).unwrap(), None);
}

#[test]
fn test_flushed_state_survives_restart() {
    use tempfile::TempDir;

    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(temp_dir.path()).unwrap();
        let storage: Arc<dyn Storage> = Arc::new(db);
        let manager = CheckpointManager::for_columns(storage, ColumnFamily::data_columns());

        manager.open_checkpoint().unwrap();
        manager
            .put(ColumnFamily::Accounts, b"alice".to_vec(), b"100".to_vec())
            .unwrap();
        manager.commit_checkpoint().unwrap();
        manager.flush_oldest(0).unwrap();
    }

    // A fresh manager over the reopened database sees the solidified state.
    {
        let db = Database::open(temp_dir.path()).unwrap();
        let storage: Arc<dyn Storage> = Arc::new(db);
        let manager = CheckpointManager::for_columns(storage, ColumnFamily::data_columns());

        assert_eq!(manager.depth(), 0);
        assert_eq!(
            manager.get(ColumnFamily::Accounts, b"alice").unwrap(),
            Some(b"100".to_vec())
        );
    }
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_revoked_writes_never_counted() {
    let ledger = TestLedger::new();
    let m = &ledger.manager;
    let accounts = m.column(ColumnFamily::Accounts).unwrap();

    // Interleave committed and reverted checkpoints; only committed writes
    // may ever be visible.
    let mut expected_live = 0usize;
    for i in 0u8..8 {
        m.open_checkpoint().unwrap();
        m.put(ColumnFamily::Accounts, vec![i], vec![i]).unwrap();
        if i % 3 == 0 {
            m.revert_checkpoint().unwrap();
        } else {
            m.commit_checkpoint().unwrap();
            expected_live += 1;
        }
    }

    assert_eq!(accounts.size().unwrap(), expected_live);
    for i in 0u8..8 {
        let expect_present = i % 3 != 0;
        assert_eq!(
            m.get(ColumnFamily::Accounts, &[i]).unwrap().is_some(),
            expect_present
        );
    }
}

#[test]
fn test_depth_sync_holds_across_lifecycle() {
    let ledger = TestLedger::new();
    let m = &ledger.manager;

    for i in 0u8..4 {
        ledger.apply_block(&[(ColumnFamily::Accounts, &[i], &[i])]);
    }
    m.revert_checkpoint().unwrap();
    m.flush_oldest(1).unwrap();

    let first = &m.columns()[0];
    for column in m.columns() {
        assert_eq!(column.depth(), first.depth());
        assert_eq!(column.head_sequence(), first.head_sequence());
        assert_eq!(column.tail_sequence(), first.tail_sequence());
    }
}

#[test]
fn test_usage_errors_are_recoverable() {
    let ledger = TestLedger::new();
    let m = &ledger.manager;

    // Protocol violations leave the manager fully usable.
    assert!(matches!(
        m.revert_checkpoint().unwrap_err(),
        StateError::NoOpenCheckpoint
    ));
    assert!(matches!(
        m.put(ColumnFamily::Accounts, b"k".to_vec(), b"v".to_vec()),
        Err(StateError::NoActiveLayer(_))
    ));

    ledger.apply_block(&[(ColumnFamily::Accounts, b"k", b"v")]);
    assert_eq!(
        m.get(ColumnFamily::Accounts, b"k").unwrap(),
        Some(b"v".to_vec())
    );
}

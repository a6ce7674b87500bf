//! Error types for the versioned state layer.

use opal_storage::StorageError;
use thiserror::Error;

/// Versioned state errors.
///
/// Usage errors (`NoActiveLayer`, `NothingToRevoke`, `NothingToFlush`,
/// `CheckpointAlreadyOpen`, `NoOpenCheckpoint`, `ResetWithActiveLayers`,
/// `UnknownColumn`) signal a caller protocol violation and never corrupt
/// state. `Desync` is an internal invariant break and is fatal: the node
/// must halt rather than keep operating on possibly-inconsistent columns.
/// `DurableWrite` is fatal for the affected column.
#[derive(Error, Debug)]
pub enum StateError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Write attempted with no snapshot layer open.
    #[error("No active layer for column {0}")]
    NoActiveLayer(&'static str),

    /// Revoke attempted on an empty chain.
    #[error("Nothing to revoke for column {0}")]
    NothingToRevoke(&'static str),

    /// Flush attempted on an empty chain.
    #[error("Nothing to flush for column {0}")]
    NothingToFlush(&'static str),

    /// A checkpoint is already open.
    #[error("Checkpoint already open")]
    CheckpointAlreadyOpen,

    /// No checkpoint to commit or revert.
    #[error("No open checkpoint")]
    NoOpenCheckpoint,

    /// Column not registered with the checkpoint manager.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Reset attempted while snapshot layers exist.
    #[error("Cannot reset column {0} while snapshot layers are active")]
    ResetWithActiveLayers(&'static str),

    /// Durable batch write failed during flush. Fatal for the column.
    #[error("Durable write failed for column {column}: {source}")]
    DurableWrite {
        column: &'static str,
        source: StorageError,
    },

    /// Column chains diverged in depth or sequence. Fatal.
    #[error("Column chains desynchronized: column {column} at sequence {found:?}, expected {expected:?}")]
    Desync {
        column: &'static str,
        expected: Option<u64>,
        found: Option<u64>,
    },
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

//! # opal-state
//!
//! Layered revoking state store for the Opal node.
//!
//! Every applied block is a cheaply-reversible layer on top of durable
//! storage: the chain can fork, and a previously-applied block may need to
//! be undone when a competing branch becomes canonical. This crate provides:
//! - `Snapshot`: one copy-on-write diff layer in a column's version chain
//! - `RevokingColumnStore`: the snapshot chain for one data column, with
//!   read-through lookup and revoke/flush chain mutation
//! - `CheckpointManager`: lockstep coordination of all columns, so a block's
//!   effects advance and revert together
//! - `BackupCoordinator`: crash-safe two-target mirroring of the durable
//!   layer on a block-count cadence
//!
//! ## Architecture
//!
//! Writes go through the [`CheckpointManager`] into each column's head
//! snapshot. Committing a block keeps its checkpoint as history; reverting
//! discards every column's head atomically. Checkpoints deeper than the
//! retention window are solidified into the durable store by
//! [`CheckpointManager::flush_oldest`].

mod backup;
mod column;
mod config;
mod error;
mod manager;
mod snapshot;

pub use backup::{BackupCoordinator, BackupError, BackupState};
pub use column::RevokingColumnStore;
pub use config::{BackupConfig, CheckpointConfig, ConfigError, StateConfig};
pub use error::{StateError, StateResult};
pub use manager::{CheckpointGuard, CheckpointManager};
pub use snapshot::{LayerLookup, Snapshot};

//! # opal-tests
//!
//! Integration tests for the Opal state store.
//!
//! This crate provides cross-crate integration testing including:
//! - Storage tests for database operations
//! - Block lifecycle tests for checkpoint apply/revert/flush
//! - Backup tests for two-target alternation and recovery

pub mod harness;


#[cfg(test)]
mod lifecycle_tests;


pub use harness::*;

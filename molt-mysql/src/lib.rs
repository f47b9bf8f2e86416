//! MySQL binlog domain types shared across the molt crates.
//!
//! This crate carries the value types the applier operates on: binlog
//! coordinates with rotation arithmetic, parsed binlog events as delivered by
//! a replication client, and decoded DML events ready for batching.

pub mod types;

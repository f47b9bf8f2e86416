//! Dependency-aware parallel binlog applier for online schema changes.
//!
//! A single streamer pulls row based replication events from an upstream
//! MySQL server and a framer cuts the flat event stream into transaction
//! units. Each unit is handed to one of a fixed pool of workers that replays
//! its DML against the ghost copy of the table under migration. Workers run
//! in parallel but honor the commit ordering the upstream recorded: a
//! transaction only starts applying once its `last_committed` dependency is
//! at or below the coordinator's low water mark, and the mark itself only
//! advances over gap free prefixes of completed sequence numbers.
//!
//! The physical replication client and the SQL execution layer are
//! collaborators supplied by the caller through the [`replication::source`]
//! and [`applier`] traits.

pub mod applier;
pub mod changelog;
pub mod concurrency;
pub mod coordinator;
pub mod error;
mod macros;
pub mod metrics;
pub mod replication;
pub mod types;

//! Shared configuration for the molt applier crates.

pub mod shared;

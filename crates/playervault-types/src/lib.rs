//! Shared type definitions for the Playervault persistence layer.
//!
//! Playervault persists mutable per-entity runtime state (position,
//! progression, inventory-like blobs, achievement completion sets) from a
//! fixed-rate tick loop into a relational store. This crate holds the value
//! types every other crate agrees on:
//!
//! - [`ids`] -- strongly-typed entity identity
//! - [`achievements`] -- achievement keys and completion-set encoding
//! - [`snapshot`] -- the immutable point-in-time [`Snapshot`] value object
//! - [`stats`] -- read-only observability snapshots of internal counters
//!
//! Nothing in this crate performs I/O or owns mutable state.

pub mod achievements;
pub mod ids;
pub mod snapshot;
pub mod stats;

// Re-export primary types for convenience.
pub use achievements::{decode_completion_set, encode_completion_set, AchievementKey};
pub use ids::EntityId;
pub use snapshot::{Blob, EntityRef, Snapshot};
pub use stats::{CacheStats, PersistStats, PoolStats};

//! Read-only observability snapshots.
//!
//! Each component owns its counters as atomics and exposes them only
//! through these value structs -- no ambient global state. Counters are
//! monotonic for the process lifetime until an explicit reset.

use serde::Serialize;

/// Point-in-time view of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently alive (available + checked out).
    pub live: u32,
    /// Connections sitting idle in the pool.
    pub available: u32,
    /// Configured maximum pool size.
    pub max: u32,
    /// Acquisitions that failed with a timeout.
    pub timeouts: u64,
}

/// Point-in-time view of the entity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed (absent or expired).
    pub misses: u64,
    /// Entries removed to make room at capacity.
    pub evictions: u64,
    /// Entries currently resident.
    pub len: usize,
}

/// Point-in-time view of the persistence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    /// Successful saves.
    pub saves: u64,
    /// Successful loads.
    pub loads: u64,
    /// Failed saves or loads.
    pub failures: u64,
    /// Saves that exceeded the slow-operation threshold (still counted
    /// as successful).
    pub slow_saves: u64,
    /// Cumulative successful save latency in milliseconds.
    pub total_save_ms: u64,
    /// Latency of the most recent successful save in milliseconds.
    pub last_save_ms: u64,
}

//! Bounded TTL + least-recently-used cache for serialized entity state.
//!
//! Sits in front of the persistence pipeline: a load within the TTL is
//! answered from here instead of the store. Entries hold whatever blob
//! bundle the store layer chooses to cache; the cache itself only tracks
//! recency, staleness, and the compressed flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use playervault_types::{CacheStats, EntityId};
use tracing::debug;

/// One cached value with its recency bookkeeping.
struct Entry<V> {
    value: V,
    last_access: Instant,
    compressed: bool,
}

/// TTL + LRU cache keyed by entity identity.
///
/// `get` never returns an expired entry; `put` at capacity evicts exactly
/// the globally least-recently-accessed entry. Hit/miss/eviction counters
/// are monotonic until [`reset_stats`](Self::reset_stats).
pub struct EntityCache<V> {
    entries: Mutex<HashMap<EntityId, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> EntityCache<V> {
    /// Create a cache holding at most `capacity` entries, each fresh for
    /// `ttl` after its last access. A zero capacity is treated as 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up an entity's cached value.
    ///
    /// A hit refreshes the entry's recency. An expired entry is removed
    /// and counted as a miss, never returned.
    pub fn get(&self, id: EntityId) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&id) {
            Some(entry) if now.saturating_duration_since(entry.last_access) <= self.ttl => {
                entry.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(&id);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entity's cached value.
    ///
    /// When the cache is at capacity and `id` is not already resident,
    /// the single entry with the oldest last access is evicted first.
    pub fn put(&self, id: EntityId, value: V, compressed: bool) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&id) {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(victim_id, _)| *victim_id);
            if let Some(victim_id) = victim {
                entries.remove(&victim_id);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(entity = %victim_id, "Evicted least-recently-used cache entry");
            }
        }
        entries.insert(
            id,
            Entry {
                value,
                last_access: Instant::now(),
                compressed,
            },
        );
    }

    /// Whether the entity's resident entry is flagged as compressed.
    pub fn is_compressed(&self, id: EntityId) -> bool {
        self.entries
            .lock()
            .get(&id)
            .is_some_and(|entry| entry.compressed)
    }

    /// Drop one entity's entry, if resident.
    pub fn invalidate(&self, id: EntityId) {
        self.entries.lock().remove(&id);
    }

    /// Drop every entry, keeping the counters.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Read-only snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.entries.lock().len(),
        }
    }

    /// Reset the counters to zero.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

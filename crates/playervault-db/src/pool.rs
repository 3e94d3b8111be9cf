//! Bounded store connection pool.
//!
//! A small free-list pool with a hard connection cap: acquisition takes
//! a still-valid idle connection if one exists, opens a new one while
//! under the cap, and otherwise backs off exponentially until the hard
//! deadline. Connections are probed both on the way out and on the way
//! back in; a dead one is closed and replaced, never surfaced.
//! The cap is enforced with a compare-and-swap reservation so two racing
//! acquisitions can never both open the final slot.
//!
//! No lock is ever held across an await; connections are moved out of
//! the free list before any I/O happens on them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use playervault_core::config::PoolConfig;
use playervault_types::PoolStats;
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::store::{Connector, StoreConn};

/// Bounded pool of store connections.
pub struct ResourcePool<C: Connector> {
    connector: C,
    free: Mutex<Vec<C::Conn>>,
    live: AtomicU32,
    max: u32,
    acquire_timeout: Duration,
    backoff_start: Duration,
    backoff_cap: Duration,
    timeouts: AtomicU64,
    closed: AtomicBool,
}

impl<C: Connector> ResourcePool<C> {
    /// Create an empty pool over the given connector.
    pub fn new(connector: C, config: &PoolConfig) -> Self {
        Self {
            connector,
            free: Mutex::new(Vec::new()),
            live: AtomicU32::new(0),
            max: config.max_connections.max(1),
            acquire_timeout: config.acquire_timeout(),
            backoff_start: config.backoff_start(),
            backoff_cap: config.backoff_cap(),
            timeouts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Check out a connection.
    ///
    /// Idle connections are probed on the way out; one that died while
    /// idle is closed and replaced without the caller ever seeing it.
    ///
    /// Returns [`PoolError::Timeout`] if no connection could be produced
    /// within the configured deadline, and [`PoolError::Closed`] after
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// See above; a failed individual connection attempt is retried
    /// until the deadline, not surfaced.
    pub async fn acquire(&self) -> Result<C::Conn, PoolError> {
        let started = Instant::now();
        let mut backoff = self.backoff_start;

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::Closed);
            }

            let idle = self.free.lock().pop();
            if let Some(mut conn) = idle {
                if conn.probe().await {
                    return Ok(conn);
                }
                warn!("Discarding idle store connection that failed its probe");
                conn.close().await;
                self.forget_one();
                continue;
            }

            if self.reserve_slot() {
                match self.connector.connect().await {
                    Ok(conn) => {
                        debug!(live = self.live.load(Ordering::Acquire), "Opened store connection");
                        return Ok(conn);
                    }
                    Err(err) => {
                        self.forget_one();
                        warn!(error = %err, "Store connection attempt failed");
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.acquire_timeout {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let stats = self.stats();
                warn!(
                    live = stats.live,
                    available = stats.available,
                    max = stats.max,
                    "Store connection acquisition timed out"
                );
                return Err(PoolError::Timeout);
            }

            let wait = backoff.min(self.acquire_timeout.saturating_sub(elapsed));
            tokio::time::sleep(wait).await;
            backoff = backoff.saturating_mul(2).min(self.backoff_cap);
        }
    }

    /// Return a checked-out connection.
    ///
    /// The connection is probed first; a dead one is closed and its slot
    /// freed instead of poisoning the free list.
    pub async fn release(&self, mut conn: C::Conn) {
        if self.closed.load(Ordering::Acquire) {
            conn.close().await;
            self.forget_one();
            return;
        }

        if conn.probe().await {
            self.free.lock().push(conn);
            // A shutdown may have raced the push; sweep so nothing idles
            // past it.
            if self.closed.load(Ordering::Acquire) {
                self.drain_free().await;
            }
        } else {
            warn!("Discarding store connection that failed its probe");
            conn.close().await;
            self.forget_one();
        }
    }

    /// Close every idle connection and reject all future acquisitions.
    ///
    /// Connections still checked out are closed as they are released.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.drain_free().await;
        debug!("Connection pool shut down");
    }

    /// Point-in-time pool occupancy and timeout count.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live.load(Ordering::Acquire),
            available: u32::try_from(self.free.lock().len()).unwrap_or(u32::MAX),
            max: self.max,
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Reserve one slot under the cap; never read-then-write.
    fn reserve_slot(&self) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        while live < self.max {
            match self.live.compare_exchange(
                live,
                live.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => live = current,
            }
        }
        false
    }

    fn forget_one(&self) {
        let _ = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                Some(live.saturating_sub(1))
            });
    }

    async fn drain_free(&self) {
        loop {
            let conn = self.free.lock().pop();
            match conn {
                Some(conn) => {
                    conn.close().await;
                    self.forget_one();
                }
                None => break,
            }
        }
    }
}

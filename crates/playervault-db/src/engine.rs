//! The save/load engine.
//!
//! A save is capture-then-persist: the owner thread produces an immutable
//! [`Snapshot`], a worker writes it through the pool, and nothing about
//! the live entity is touched afterwards. A load is the reverse, split
//! the same way: a worker fetches the row, then every attribute is
//! applied back on the owner thread via queued tasks.
//!
//! The engine also owns the self-healing width path: a store rejection
//! for an oversized value widens the offending column once per process
//! and lets the caller's retry succeed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use playervault_core::catalog::AchievementCatalog;
use playervault_core::config::VaultConfig;
use playervault_core::dispatch::{owner_call, Dispatcher};
use playervault_core::host::AttributeApply;
use playervault_core::import::ImportCoordinator;
use playervault_types::{decode_completion_set, EntityId, PersistStats, Snapshot};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::pool::ResourcePool;
use crate::row::EntityRow;
use crate::store::{Connector, StoreConn};

/// Save/load engine over one pool and one import coordinator.
pub struct PersistenceEngine<C: Connector> {
    pool: Arc<ResourcePool<C>>,
    imports: Arc<ImportCoordinator>,
    catalog: Arc<AchievementCatalog>,
    server_id: String,
    slow_save_threshold: Duration,
    large_set_threshold: usize,
    apply_batch_size: usize,
    apply_batch_delay_ticks: u64,
    /// Columns already widened this process; widen at most once each.
    widened: DashSet<String>,
    saves: AtomicU64,
    loads: AtomicU64,
    failures: AtomicU64,
    slow_saves: AtomicU64,
    total_save_ms: AtomicU64,
    last_save_ms: AtomicU64,
}

impl<C: Connector> PersistenceEngine<C> {
    /// Create an engine over the given pool, import coordinator, and
    /// catalog.
    pub fn new(
        pool: Arc<ResourcePool<C>>,
        imports: Arc<ImportCoordinator>,
        catalog: Arc<AchievementCatalog>,
        config: &VaultConfig,
    ) -> Self {
        Self {
            pool,
            imports,
            catalog,
            server_id: config.persist.server_id.clone(),
            slow_save_threshold: config.persist.slow_save_threshold(),
            large_set_threshold: config.import.large_set_threshold,
            apply_batch_size: config.import.apply_batch_size.max(1),
            apply_batch_delay_ticks: config.import.apply_batch_delay_ticks,
            widened: DashSet::new(),
            saves: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            slow_saves: AtomicU64::new(0),
            total_save_ms: AtomicU64::new(0),
            last_save_ms: AtomicU64::new(0),
        }
    }

    /// Capture one entity on the owner thread and persist the result.
    ///
    /// Returns `Ok(None)` when no snapshot could be captured (entity
    /// detached or unreadable); nothing touches the store in that case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store write fails.
    pub async fn save_entity(
        &self,
        dispatcher: &dyn Dispatcher,
        id: EntityId,
    ) -> Result<Option<EntityRow>, StoreError> {
        let captured = owner_call(dispatcher, move |host| host.capture_snapshot(id))
            .await
            .flatten();
        let Some(snapshot) = captured else {
            debug!(entity = %id, "No snapshot captured; save aborted");
            return Ok(None);
        };
        self.save_snapshot(snapshot).await.map(Some)
    }

    /// Persist an already-captured snapshot.
    ///
    /// The completion-set payload is replaced by the import coordinator's
    /// current view, which includes completions parked by an in-flight
    /// import.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store write fails; a save slower
    /// than the configured threshold is logged but still a success.
    pub async fn save_snapshot(&self, mut snapshot: Snapshot) -> Result<EntityRow, StoreError> {
        snapshot.server_id.clone_from(&self.server_id);
        if let Some(payload) = self.imports.export(snapshot.id) {
            snapshot.completions = payload;
        }
        let id = snapshot.id;
        let row = EntityRow::from_snapshot(&snapshot);

        let started = Instant::now();
        let outcome = self.write_row(&row).await;
        match outcome {
            Ok(()) => {
                self.note_save(id, started.elapsed());
                Ok(row)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(entity = %id, error = %err, "Entity save failed");
                Err(err)
            }
        }
    }

    /// Fetch one entity's row and restore it to the live entity.
    ///
    /// Returns whether a stored row existed. A missing row (or an empty
    /// completion payload) queues a staged import instead of seeding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store read fails.
    pub async fn load_entity(
        &self,
        dispatcher: &dyn Dispatcher,
        id: EntityId,
    ) -> Result<Option<EntityRow>, StoreError> {
        let fetched = self.fetch_row(id).await;
        match fetched {
            Ok(Some(row)) => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                self.restore(dispatcher, row.clone());
                Ok(Some(row))
            }
            Ok(None) => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                debug!(entity = %id, "No stored row; queuing staged import");
                self.queue_import(id);
                Ok(None)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(entity = %id, error = %err, "Entity load failed");
                Err(err)
            }
        }
    }

    /// Seed completion state from a fetched row and schedule every
    /// attribute for owner-thread application.
    pub fn restore(&self, dispatcher: &dyn Dispatcher, row: EntityRow) {
        let id = EntityId::from(row.id);

        if row.completions.is_empty() {
            self.queue_import(id);
        } else {
            self.imports.seed_from_store(id, Some(&row.completions));
        }

        let snapshot = row.into_snapshot();
        let (keys, skipped) = decode_completion_set(&snapshot.completions);
        if skipped > 0 {
            warn!(entity = %id, skipped, "Skipped malformed completion tokens during restore");
        }

        let applies = vec![
            AttributeApply::Position {
                world: snapshot.world,
                x: snapshot.x,
                y: snapshot.y,
                z: snapshot.z,
                yaw: snapshot.yaw,
                pitch: snapshot.pitch,
            },
            AttributeApply::Experience {
                level: snapshot.xp_level,
                progress: snapshot.xp_progress,
            },
            AttributeApply::Health(snapshot.health),
            AttributeApply::Hunger(snapshot.hunger),
            AttributeApply::Inventory(snapshot.inventory),
            AttributeApply::Armor(snapshot.armor),
            AttributeApply::Offhand(snapshot.offhand),
            AttributeApply::Effects(snapshot.effects),
            AttributeApply::Statistics(snapshot.statistics),
            AttributeApply::Attributes(snapshot.attributes),
            AttributeApply::Balance(snapshot.balance),
        ];
        dispatcher.run_on_owner(Box::new(move |host| {
            if !host.is_attached(id) {
                debug!(entity = %id, "Entity detached before restore; applies skipped");
                return;
            }
            for apply in applies {
                host.apply(id, apply);
            }
        }));

        if keys.is_empty() {
            return;
        }
        if keys.len() <= self.large_set_threshold {
            dispatcher.run_on_owner(Box::new(move |host| {
                host.apply(id, AttributeApply::Completions(keys));
            }));
        } else {
            // Spread a large grant across ticks so one load cannot stall
            // the owner thread.
            info!(
                entity = %id,
                total = keys.len(),
                batch = self.apply_batch_size,
                "Applying large completion set in batches"
            );
            for (index, chunk) in keys.chunks(self.apply_batch_size).enumerate() {
                let batch = chunk.to_vec();
                let delay = u64::try_from(index)
                    .unwrap_or(u64::MAX)
                    .saturating_mul(self.apply_batch_delay_ticks);
                dispatcher.run_on_owner_after(
                    delay,
                    Box::new(move |host| {
                        host.apply(id, AttributeApply::Completions(batch));
                    }),
                );
            }
        }
    }

    /// Point-in-time engine counters.
    pub fn stats(&self) -> PersistStats {
        PersistStats {
            saves: self.saves.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            slow_saves: self.slow_saves.load(Ordering::Relaxed),
            total_save_ms: self.total_save_ms.load(Ordering::Relaxed),
            last_save_ms: self.last_save_ms.load(Ordering::Relaxed),
        }
    }

    /// Zero the engine counters.
    pub fn reset_stats(&self) {
        self.saves.store(0, Ordering::Relaxed);
        self.loads.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.slow_saves.store(0, Ordering::Relaxed);
        self.total_save_ms.store(0, Ordering::Relaxed);
        self.last_save_ms.store(0, Ordering::Relaxed);
    }

    fn queue_import(&self, id: EntityId) {
        self.imports.seed_from_store(id, None);
        self.imports.queue_import(id, false);
        self.catalog.start_build(false);
    }

    async fn write_row(&self, row: &EntityRow) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let outcome = conn.upsert(row).await;

        if let Err(StoreError::TooWide { column }) = &outcome {
            // Widen at most once per column per process. The current
            // attempt still fails; the caller's next save goes through.
            if self.widened.insert(column.clone()) {
                match conn.widen_column(column).await {
                    Ok(()) => {
                        warn!(column, "Column widened after oversized value");
                    }
                    Err(widen_err) => {
                        self.widened.remove(column);
                        error!(column, error = %widen_err, "Column widen failed");
                    }
                }
            }
        }

        self.pool.release(conn).await;
        outcome
    }

    async fn fetch_row(&self, id: EntityId) -> Result<Option<EntityRow>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let outcome = conn.fetch(id.into_inner()).await;
        self.pool.release(conn).await;
        outcome
    }

    fn note_save(&self, id: EntityId, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.total_save_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.last_save_ms.store(elapsed_ms, Ordering::Relaxed);
        if elapsed > self.slow_save_threshold {
            self.slow_saves.fetch_add(1, Ordering::Relaxed);
            warn!(entity = %id, elapsed_ms, "Slow entity save");
        } else {
            debug!(entity = %id, elapsed_ms, "Entity saved");
        }
    }
}

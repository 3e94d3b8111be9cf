//! The top-level persistence service facade.
//!
//! One [`PersistenceService`] wires the pool, engine, cache, catalog,
//! and import coordinator together and exposes the handful of calls an
//! embedding host actually makes: a per-tick drive, save/load, import
//! control, and stats. The host's tick loop calls [`tick`] once per tick
//! with the live [`Host`]; everything else may be called from worker
//! context.
//!
//! [`tick`]: PersistenceService::tick

use std::sync::Arc;

use playervault_core::cache::EntityCache;
use playervault_core::catalog::{AchievementCatalog, CatalogStatus};
use playervault_core::config::VaultConfig;
use playervault_core::dispatch::{Dispatcher, TickQueue};
use playervault_core::host::Host;
use playervault_core::import::{ImportCoordinator, ImportPhase};
use playervault_types::{AchievementKey, CacheStats, EntityId, PersistStats, PoolStats};
use tracing::{debug, info};

use crate::engine::PersistenceEngine;
use crate::error::StoreError;
use crate::pool::ResourcePool;
use crate::row::EntityRow;
use crate::store::{Connector, StoreConn};

/// Everything an embedding host needs, behind one handle.
pub struct PersistenceService<C: Connector> {
    pool: Arc<ResourcePool<C>>,
    engine: Arc<PersistenceEngine<C>>,
    queue: Arc<TickQueue>,
    catalog: Arc<AchievementCatalog>,
    imports: Arc<ImportCoordinator>,
    cache: Arc<EntityCache<EntityRow>>,
    autosave_interval: u64,
}

impl<C: Connector> PersistenceService<C> {
    /// Assemble a service over the given store connector.
    pub fn new(connector: C, config: &VaultConfig) -> Self {
        let pool = Arc::new(ResourcePool::new(connector, &config.pool));
        let imports = Arc::new(ImportCoordinator::new(
            config.import.batch_size,
            config.import.max_catalog_entries,
        ));
        let catalog = Arc::new(AchievementCatalog::new(
            config.import.batch_size,
            config.import.max_catalog_entries,
        ));
        let engine = Arc::new(PersistenceEngine::new(
            Arc::clone(&pool),
            Arc::clone(&imports),
            Arc::clone(&catalog),
            config,
        ));
        Self {
            pool,
            engine,
            queue: Arc::new(TickQueue::new()),
            catalog,
            imports,
            cache: Arc::new(EntityCache::new(config.cache.capacity, config.cache.ttl())),
            autosave_interval: config.persist.autosave_interval_ticks,
        }
    }

    /// Bootstrap the store schema.
    ///
    /// Creates the wide table if absent and adds any missing columns;
    /// safe to call on every startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a connection cannot be acquired or the
    /// schema statements fail.
    pub async fn init(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let outcome = conn.ensure_schema().await;
        self.pool.release(conn).await;
        outcome?;
        info!("Store schema verified");
        Ok(())
    }

    /// The dispatcher workers use to reach the owner thread.
    pub fn dispatcher(&self) -> Arc<TickQueue> {
        Arc::clone(&self.queue)
    }

    /// Drive one tick: drain queued owner tasks, advance the catalog
    /// build and every staged import, and kick off an autosave sweep on
    /// the configured cadence.
    ///
    /// Must be called from the owner thread, once per tick.
    pub fn tick(&self, host: &mut dyn Host, now_tick: u64) {
        self.queue.drain(host, now_tick);
        self.catalog.tick_build(host);
        self.imports.tick(host, &self.catalog);

        let due = self.autosave_interval > 0
            && now_tick > 0
            && now_tick.checked_rem(self.autosave_interval) == Some(0);
        if due {
            self.autosave(host, now_tick);
        }
    }

    /// Save one entity now: capture on the owner thread, persist on a
    /// worker, and refresh the cache on success.
    ///
    /// Returns whether a snapshot was captured and persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store write fails.
    pub async fn save(&self, id: EntityId) -> Result<bool, StoreError> {
        let saved = self.engine.save_entity(self.queue.as_ref(), id).await?;
        match saved {
            Some(row) => {
                self.cache.put(id, row, false);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load one entity: fetch its row (from cache when fresh), seed its
    /// completion state, and schedule the attribute applies.
    ///
    /// Returns whether stored state existed; a miss queues a staged
    /// import instead.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store read fails.
    pub async fn load(&self, id: EntityId) -> Result<bool, StoreError> {
        if let Some(row) = self.cache.get(id) {
            debug!(entity = %id, "Load served from cache");
            self.engine.restore(self.queue.as_ref(), row);
            return Ok(true);
        }
        let loaded = self.engine.load_entity(self.queue.as_ref(), id).await?;
        match loaded {
            Some(row) => {
                self.cache.put(id, row, false);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queue a staged completion-set import for one entity.
    pub fn queue_import(&self, id: EntityId, force: bool) {
        self.imports.queue_import(id, force);
        self.catalog.start_build(false);
    }

    /// Record a live completion event for one entity.
    pub fn record_completion(&self, id: EntityId, key: AchievementKey) {
        self.imports.record_completion(id, key);
    }

    /// Force a rebuild of the global achievement catalog.
    pub fn rebuild_catalog(&self) -> bool {
        self.catalog.start_build(true)
    }

    /// Build status of the global achievement catalog.
    pub fn catalog_status(&self) -> CatalogStatus {
        self.catalog.status()
    }

    /// Import phase for one entity, if it is tracked.
    pub fn entity_import_status(&self, id: EntityId) -> Option<ImportPhase> {
        self.imports.phase(id)
    }

    /// Whether one entity has the given achievement completed.
    pub fn is_completed(&self, id: EntityId, key: &AchievementKey) -> bool {
        self.imports.is_completed(id, key)
    }

    /// Drop one entity's cached row.
    pub fn invalidate_cache(&self, id: EntityId) {
        self.cache.invalidate(id);
    }

    /// Connection pool occupancy and timeout counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Entity cache hit/miss/eviction counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Save/load engine counters.
    pub fn persist_stats(&self) -> PersistStats {
        self.engine.stats()
    }

    /// Zero every performance counter (pool timeouts are kept).
    pub fn reset_performance_stats(&self) {
        self.engine.reset_stats();
        self.cache.reset_stats();
    }

    /// Shut the pool down; later saves and loads fail with
    /// [`StoreError::Pool`].
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Persistence service shut down");
    }

    /// Capture every attached entity inline and hand the store writes to
    /// workers. Capture stays on the owner thread; only the writes leave
    /// it.
    fn autosave(&self, host: &dyn Host, now_tick: u64) {
        let ids = host.attached();
        if ids.is_empty() {
            return;
        }
        debug!(tick = now_tick, entities = ids.len(), "Autosave sweep");
        for id in ids {
            let Some(snapshot) = host.capture_snapshot(id) else {
                continue;
            };
            let engine = Arc::clone(&self.engine);
            let cache = Arc::clone(&self.cache);
            self.queue.spawn_worker(Box::pin(async move {
                // Failures are counted and logged by the engine.
                if let Ok(row) = engine.save_snapshot(snapshot).await {
                    cache.put(id, row, false);
                }
            }));
        }
    }
}

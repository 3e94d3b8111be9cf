//! Integration tests for the persistence service facade.
//!
//! These run the full stack -- service, engine, pool, cache, catalog,
//! and import coordinator -- against the in-memory store backend, with
//! a [`StubHost`] standing in for the game runtime and the test driving
//! the tick loop by hand. No external services are required.

// Test code panics on failure by design.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::sync::atomic::Ordering;

use playervault_core::catalog::CatalogStatus;
use playervault_core::config::VaultConfig;
use playervault_core::host::StubHost;
use playervault_core::import::ImportPhase;
use playervault_db::{MemConnector, MemTable, PersistenceService, PoolError, StoreError};
use playervault_types::{AchievementKey, EntityId, Snapshot};

type Service = PersistenceService<MemConnector>;

fn config() -> VaultConfig {
    let mut config = VaultConfig::default();
    config.pool.max_connections = 2;
    config.pool.acquire_timeout_ms = 200;
    config.pool.backoff_start_ms = 1;
    config.import.batch_size = 4;
    config
}

fn service_with(config: &VaultConfig) -> (Arc<Service>, Arc<MemTable>) {
    let table = MemTable::new();
    let service = Arc::new(PersistenceService::new(
        MemConnector::new(Arc::clone(&table)),
        config,
    ));
    (service, table)
}

fn key(raw: &str) -> AchievementKey {
    AchievementKey::parse(raw).expect("valid key")
}

/// Run the tick loop until the spawned service call settles.
async fn settle<T: Send + 'static>(
    service: &Service,
    host: &mut StubHost,
    start_tick: u64,
    handle: tokio::task::JoinHandle<T>,
) -> (T, u64) {
    let mut tick = start_tick;
    loop {
        tokio::task::yield_now().await;
        tick = tick.saturating_add(1);
        service.tick(host, tick);
        if handle.is_finished() {
            break;
        }
    }
    (handle.await.expect("service task panicked"), tick)
}

#[tokio::test]
async fn init_is_idempotent() {
    let (service, _table) = service_with(&config());
    service.init().await.expect("first init");
    service.init().await.expect("second init");
}

#[tokio::test]
async fn first_join_imports_then_saves_the_completion_set() {
    let (service, table) = service_with(&config());
    service.init().await.unwrap();

    let mut host = StubHost::new();
    host.achievements = StubHost::seeded_catalog(10);
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));
    host.complete(id, key("stub:a/2"));
    host.complete(id, key("stub:a/8"));

    // No stored row: the load reports a miss and queues an import.
    let loaded = service.load(id).await.unwrap();
    assert!(!loaded);
    assert_eq!(service.entity_import_status(id), Some(ImportPhase::AwaitingCatalog));

    // Drive ticks until the catalog builds and the import completes.
    let mut tick = 100_u64;
    while service.entity_import_status(id) != Some(ImportPhase::Ready) {
        tick += 1;
        service.tick(&mut host, tick);
        assert!(tick < 200, "import did not converge");
    }
    assert_eq!(service.catalog_status(), CatalogStatus::Ready);
    assert!(service.is_completed(id, &key("stub:a/2")));
    assert!(service.is_completed(id, &key("stub:a/8")));
    assert!(!service.is_completed(id, &key("stub:a/5")));

    // A save persists exactly the reconciled set.
    let saved = {
        let service_clone = Arc::clone(&service);
        let handle = tokio::spawn(async move { service_clone.save(id).await });
        settle(&service, &mut host, tick, handle).await.0.unwrap()
    };
    assert!(saved);
    let row = table.row(id.into_inner()).expect("row persisted");
    assert_eq!(row.completions, "stub:a/2,stub:a/8");
    assert_eq!(row.name, "Alice");
}

#[tokio::test]
async fn second_load_is_served_from_the_cache() {
    let (service, table) = service_with(&config());
    let mut host = StubHost::new();
    let id = EntityId::new();
    let mut live = Snapshot::blank(id, "Alice");
    live.world = "nether".to_owned();
    live.hunger = 9;
    host.attach(live);

    let saved = {
        let service_clone = Arc::clone(&service);
        let handle = tokio::spawn(async move { service_clone.save(id).await });
        settle(&service, &mut host, 0, handle).await.0.unwrap()
    };
    assert!(saved);
    let fetches_before = table.fetches.load(Ordering::Relaxed);

    // Reset live state, then load: the row comes from the cache and the
    // attributes are re-applied on the next tick.
    host.attach(Snapshot::blank(id, "Alice"));
    assert!(service.load(id).await.unwrap());
    assert_eq!(
        table.fetches.load(Ordering::Relaxed),
        fetches_before,
        "cache hit must not touch the store"
    );
    service.tick(&mut host, 500);

    let snap = host.snapshots.get(&id).expect("live snapshot");
    assert_eq!(snap.world, "nether");
    assert_eq!(snap.hunger, 9);
    assert!(service.cache_stats().hits >= 1);
}

#[tokio::test]
async fn cache_invalidation_forces_a_store_fetch() {
    let (service, table) = service_with(&config());
    let mut host = StubHost::new();
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));

    {
        let service_clone = Arc::clone(&service);
        let handle = tokio::spawn(async move { service_clone.save(id).await });
        settle(&service, &mut host, 0, handle).await.0.unwrap();
    }

    service.invalidate_cache(id);
    let fetches_before = table.fetches.load(Ordering::Relaxed);
    assert!(service.load(id).await.unwrap());
    assert_eq!(
        table.fetches.load(Ordering::Relaxed),
        fetches_before + 1
    );
}

#[tokio::test]
async fn autosave_sweeps_every_attached_entity() {
    let mut config = config();
    config.persist.autosave_interval_ticks = 5;
    let (service, table) = service_with(&config);

    let mut host = StubHost::new();
    let alice = EntityId::new();
    let bob = EntityId::new();
    host.attach(Snapshot::blank(alice, "Alice"));
    host.attach(Snapshot::blank(bob, "Bob"));

    for tick in 1..=5 {
        service.tick(&mut host, tick);
    }
    // The writes run on workers; yield until both rows land.
    for _ in 0..100 {
        tokio::task::yield_now().await;
        if table.row_count() == 2 {
            break;
        }
    }
    assert_eq!(table.row_count(), 2);
    assert!(table.row(alice.into_inner()).is_some());
    assert!(table.row(bob.into_inner()).is_some());
    assert_eq!(service.persist_stats().saves, 2);

    // Off-cadence ticks do not sweep again.
    let upserts = table.upserts.load(Ordering::Relaxed);
    for tick in 6..=9 {
        service.tick(&mut host, tick);
    }
    tokio::task::yield_now().await;
    assert_eq!(table.upserts.load(Ordering::Relaxed), upserts);
}

#[tokio::test]
async fn forced_import_recomputes_a_ready_entity() {
    let (service, _table) = service_with(&config());
    let mut host = StubHost::new();
    host.achievements = StubHost::seeded_catalog(6);
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));
    host.complete(id, key("stub:a/1"));

    // Seeded Ready via a fake stored payload that the host disagrees with.
    service.queue_import(id, false);
    let mut tick = 0_u64;
    while service.entity_import_status(id) != Some(ImportPhase::Ready) {
        tick += 1;
        service.tick(&mut host, tick);
        assert!(tick < 100, "import did not converge");
    }
    assert!(service.is_completed(id, &key("stub:a/1")));

    // The host gains a completion; a forced re-import picks it up.
    host.complete(id, key("stub:a/4"));
    service.queue_import(id, true);
    while service.entity_import_status(id) != Some(ImportPhase::Ready) {
        tick += 1;
        service.tick(&mut host, tick);
        assert!(tick < 200, "forced import did not converge");
    }
    assert!(service.is_completed(id, &key("stub:a/4")));
}

#[tokio::test]
async fn live_completions_survive_a_concurrent_import() {
    let (service, _table) = service_with(&config());
    let mut host = StubHost::new();
    host.achievements = StubHost::seeded_catalog(20);
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));

    service.queue_import(id, false);
    let mut tick = 0_u64;
    while service.entity_import_status(id) != Some(ImportPhase::Importing) {
        tick += 1;
        service.tick(&mut host, tick);
        assert!(tick < 100);
    }

    // Earned mid-import: parked, then merged.
    service.record_completion(id, key("live:event"));
    assert!(!service.is_completed(id, &key("live:event")));

    while service.entity_import_status(id) != Some(ImportPhase::Ready) {
        tick += 1;
        service.tick(&mut host, tick);
        assert!(tick < 200);
    }
    assert!(service.is_completed(id, &key("live:event")));
}

#[tokio::test]
async fn counters_reflect_activity_and_reset() {
    let (service, _table) = service_with(&config());
    let mut host = StubHost::new();
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));

    {
        let service_clone = Arc::clone(&service);
        let handle = tokio::spawn(async move { service_clone.save(id).await });
        settle(&service, &mut host, 0, handle).await.0.unwrap();
    }
    assert!(service.load(id).await.unwrap());

    let persist = service.persist_stats();
    assert_eq!(persist.saves, 1);
    assert_eq!(persist.failures, 0);
    let pool = service.pool_stats();
    assert_eq!(pool.max, 2);
    assert!(pool.live >= 1);

    service.reset_performance_stats();
    let persist = service.persist_stats();
    assert_eq!((persist.saves, persist.loads, persist.slow_saves), (0, 0, 0));
    let cache = service.cache_stats();
    assert_eq!((cache.hits, cache.misses), (0, 0));
}

#[tokio::test]
async fn shutdown_rejects_later_saves() {
    let (service, _table) = service_with(&config());
    let mut host = StubHost::new();
    let id = EntityId::new();
    host.attach(Snapshot::blank(id, "Alice"));

    service.shutdown().await;

    let result = {
        let service_clone = Arc::clone(&service);
        let handle = tokio::spawn(async move { service_clone.save(id).await });
        settle(&service, &mut host, 0, handle).await.0
    };
    assert!(matches!(
        result,
        Err(StoreError::Pool(PoolError::Closed))
    ));
    assert_eq!(service.pool_stats().live, 0);
}

//! Per-entity staged reconciliation of completion sets.
//!
//! On first reference an entity either seeds its completion set from a
//! previously persisted payload or walks the global catalog in bounded
//! batches across ticks, checking per-entry completion against the live
//! entity. Completions that arrive *while* that walk is running are
//! parked in `pending_during_import` and merged exactly once, atomically
//! with the transition to `Ready`, so a finishing import can never
//! overwrite them.
//!
//! Entity state lives in a concurrent map and the sets are concurrent
//! sets: the tick-thread batch loop and the completion-recording path
//! both write here without a single giant lock.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use playervault_types::{decode_completion_set, encode_completion_set, AchievementKey, EntityId};
use tracing::{debug, error, info, warn};

use crate::catalog::{AchievementCatalog, CatalogStatus};
use crate::host::Host;
use crate::walker::{BatchWalker, WalkStatus};

/// Phase of one entity's completion-set reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    /// No import has been requested (or the stored payload was absent).
    NotStarted,
    /// An import was requested but the global catalog is not `Ready` yet;
    /// polled again next tick.
    AwaitingCatalog,
    /// The catalog walk is in progress, one batch per tick.
    Importing,
    /// The completion set is authoritative.
    Ready,
}

/// Walk state for one entity's import, guarded by a small lock so phase
/// transitions and the terminal merge are atomic with respect to
/// completion recording.
struct ImportRun {
    phase: ImportPhase,
    walker: Option<BatchWalker>,
    working: Vec<AchievementKey>,
}

/// One entity's completion-set state.
pub struct EntityAchievements {
    /// Authoritative completed set.
    completed: DashSet<AchievementKey>,
    /// Completions recorded while an import was running.
    pending: DashSet<AchievementKey>,
    run: Mutex<ImportRun>,
}

impl EntityAchievements {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            completed: DashSet::new(),
            pending: DashSet::new(),
            run: Mutex::new(ImportRun {
                phase: ImportPhase::NotStarted,
                walker: None,
                working: Vec::new(),
            }),
        })
    }
}

/// Coordinates staged imports for every tracked entity.
pub struct ImportCoordinator {
    entries: DashMap<EntityId, Arc<EntityAchievements>>,
    batch_size: usize,
    ceiling: usize,
}

impl ImportCoordinator {
    /// Create a coordinator with the given per-tick batch size and hard
    /// processed-count ceiling.
    pub fn new(batch_size: usize, ceiling: usize) -> Self {
        Self {
            entries: DashMap::new(),
            batch_size,
            ceiling,
        }
    }

    fn entry(&self, id: EntityId) -> Arc<EntityAchievements> {
        self.entries
            .entry(id)
            .or_insert_with(EntityAchievements::new)
            .clone()
    }

    /// Current phase for an entity, if it is tracked at all.
    pub fn phase(&self, id: EntityId) -> Option<ImportPhase> {
        self.entries.get(&id).map(|ea| ea.run.lock().phase)
    }

    /// Number of achievements in the authoritative completed set.
    pub fn completed_count(&self, id: EntityId) -> usize {
        self.entries.get(&id).map_or(0, |ea| ea.completed.len())
    }

    /// Whether the achievement is in the authoritative completed set.
    ///
    /// Completions parked during an in-flight import do not count until
    /// the terminal merge.
    pub fn is_completed(&self, id: EntityId, key: &AchievementKey) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|ea| ea.completed.contains(key))
    }

    /// Request a staged import for one entity.
    ///
    /// A `Ready` entity is left untouched unless `force` is set; a forced
    /// import discards the current set and recomputes it from the catalog.
    pub fn queue_import(&self, id: EntityId, force: bool) {
        let ea = self.entry(id);
        let mut run = ea.run.lock();
        if run.phase == ImportPhase::Ready && !force {
            return;
        }
        ea.completed.clear();
        ea.pending.clear();
        run.walker = None;
        run.working.clear();
        run.phase = ImportPhase::AwaitingCatalog;
        debug!(entity = %id, force, "Import queued");
    }

    /// Record a completion event for an entity.
    ///
    /// While the entity is `Importing` the key is parked in the pending
    /// set instead of `completed`, so the import's terminal merge cannot
    /// lose it.
    pub fn record_completion(&self, id: EntityId, key: AchievementKey) {
        let ea = self.entry(id);
        let run = ea.run.lock();
        if run.phase == ImportPhase::Importing {
            ea.pending.insert(key);
        } else {
            ea.completed.insert(key);
        }
    }

    /// Seed an entity directly from a persisted payload.
    ///
    /// `Some` payload short-circuits any import: the entity becomes
    /// `Ready` with exactly the decoded set. `None` (no stored payload)
    /// resets the entity to `NotStarted`.
    pub fn seed_from_store(&self, id: EntityId, payload: Option<&str>) {
        let ea = self.entry(id);
        let mut run = ea.run.lock();
        ea.completed.clear();
        ea.pending.clear();
        run.walker = None;
        run.working.clear();
        match payload {
            Some(raw) => {
                let (keys, skipped) = decode_completion_set(raw);
                if skipped > 0 {
                    warn!(entity = %id, skipped, "Skipped malformed completion tokens");
                }
                let count = keys.len();
                for key in keys {
                    ea.completed.insert(key);
                }
                run.phase = ImportPhase::Ready;
                debug!(entity = %id, count, "Completion set seeded from store");
            }
            None => {
                run.phase = ImportPhase::NotStarted;
            }
        }
    }

    /// The persistable comma-joined payload for one entity.
    ///
    /// Includes completions still parked by an in-flight import, so a
    /// save during an import persists everything known so far.
    pub fn export(&self, id: EntityId) -> Option<String> {
        let ea = self.entries.get(&id)?;
        let keys = ea
            .completed
            .iter()
            .map(|k| k.clone())
            .chain(ea.pending.iter().map(|k| k.clone()));
        Some(encode_completion_set(keys))
    }

    /// Drop all state for an entity (administrative purge).
    pub fn forget(&self, id: EntityId) {
        self.entries.remove(&id);
    }

    /// Drive every queued import by at most one batch.
    ///
    /// Runs on the tick thread; per-tick cost is bounded by the batch
    /// size times the number of entities mid-import.
    pub fn tick(&self, host: &dyn Host, catalog: &AchievementCatalog) {
        for item in &self.entries {
            let id = *item.key();
            let ea = Arc::clone(item.value());
            self.drive(id, &ea, host, catalog);
        }
    }

    fn drive(
        &self,
        id: EntityId,
        ea: &EntityAchievements,
        host: &dyn Host,
        catalog: &AchievementCatalog,
    ) {
        let mut run = ea.run.lock();
        match run.phase {
            ImportPhase::NotStarted | ImportPhase::Ready => {}
            ImportPhase::AwaitingCatalog => {
                if catalog.status() == CatalogStatus::Ready {
                    run.phase = ImportPhase::Importing;
                    run.walker = Some(BatchWalker::new(self.batch_size, self.ceiling));
                    run.working.clear();
                    self.step_import(id, ea, &mut run, host, catalog);
                }
            }
            ImportPhase::Importing => {
                if !host.is_attached(id) {
                    // Disconnected mid-import: abandon the walk but keep the
                    // phase, so reattachment re-triggers a fresh walk instead
                    // of resuming a stale one.
                    run.walker = None;
                    return;
                }
                if run.walker.is_none() {
                    run.working.clear();
                    run.walker = Some(BatchWalker::new(self.batch_size, self.ceiling));
                    debug!(entity = %id, "Restarting abandoned import walk");
                }
                self.step_import(id, ea, &mut run, host, catalog);
            }
        }
    }

    fn step_import(
        &self,
        id: EntityId,
        ea: &EntityAchievements,
        run: &mut ImportRun,
        host: &dyn Host,
        catalog: &AchievementCatalog,
    ) {
        let Some(mut walker) = run.walker.take() else {
            return;
        };

        let mut matched = Vec::new();
        let status = walker.step(
            |offset, limit| catalog.page(offset, limit),
            |key| {
                if host.has_completed(id, &key) {
                    matched.push(key);
                }
            },
        );
        run.working.append(&mut matched);

        match status {
            WalkStatus::InProgress => {
                run.walker = Some(walker);
            }
            WalkStatus::Finished => {
                // Terminal merge: the working set becomes `completed` and
                // anything recorded during the walk is folded in, all under
                // the run lock so no completion event can race the flip.
                ea.completed.clear();
                for key in run.working.drain(..) {
                    ea.completed.insert(key);
                }
                let parked: Vec<AchievementKey> =
                    ea.pending.iter().map(|k| k.clone()).collect();
                ea.pending.clear();
                for key in parked {
                    ea.completed.insert(key);
                }
                run.phase = ImportPhase::Ready;
                info!(entity = %id, completed = ea.completed.len(), "Import complete");
            }
            WalkStatus::Overrun { processed } => {
                run.working.clear();
                run.phase = ImportPhase::NotStarted;
                error!(
                    entity = %id,
                    processed,
                    ceiling = self.ceiling,
                    "Import exceeded its hard ceiling; aborted"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::StubHost;
    use playervault_types::Snapshot;

    fn ready_catalog(host: &StubHost, batch: usize) -> AchievementCatalog {
        let catalog = AchievementCatalog::new(batch, 1_000_000);
        catalog.start_build(false);
        while catalog.status() == CatalogStatus::Running {
            catalog.tick_build(host);
        }
        assert_eq!(catalog.status(), CatalogStatus::Ready);
        catalog
    }

    fn key(raw: &str) -> AchievementKey {
        AchievementKey::parse(raw).unwrap()
    }

    #[test]
    fn seeding_with_payload_is_ready_without_import() {
        let coordinator = ImportCoordinator::new(250, 100_000);
        let id = EntityId::new();
        coordinator.seed_from_store(id, Some("pack:a,pack:b,pack:c"));

        assert_eq!(coordinator.phase(id), Some(ImportPhase::Ready));
        assert_eq!(coordinator.completed_count(id), 3);
        assert!(coordinator.is_completed(id, &key("pack:b")));

        // No import work happens for a seeded entity.
        let host = StubHost::new();
        let catalog = ready_catalog(&host, 10);
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Ready));
        assert_eq!(coordinator.completed_count(id), 3);
    }

    #[test]
    fn seeding_with_absent_payload_is_not_started() {
        let coordinator = ImportCoordinator::new(250, 100_000);
        let id = EntityId::new();
        coordinator.seed_from_store(id, None);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::NotStarted));
        assert_eq!(coordinator.completed_count(id), 0);
    }

    #[test]
    fn import_waits_for_the_catalog() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(10);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        let coordinator = ImportCoordinator::new(4, 100_000);
        let catalog = AchievementCatalog::new(4, 1_000_000);

        coordinator.queue_import(id, false);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::AwaitingCatalog));

        // Catalog still Idle: polled again, no transition.
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::AwaitingCatalog));

        catalog.start_build(false);
        while catalog.status() == CatalogStatus::Running {
            catalog.tick_build(&host);
        }
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Importing));
    }

    #[test]
    fn import_finds_completions_from_the_host() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(10);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));
        host.complete(id, key("stub:a/3"));
        host.complete(id, key("stub:a/7"));

        let catalog = ready_catalog(&host, 100);
        let coordinator = ImportCoordinator::new(4, 100_000);
        coordinator.queue_import(id, false);

        while coordinator.phase(id) != Some(ImportPhase::Ready) {
            coordinator.tick(&host, &catalog);
        }
        assert_eq!(coordinator.completed_count(id), 2);
        assert!(coordinator.is_completed(id, &key("stub:a/3")));
        assert!(coordinator.is_completed(id, &key("stub:a/7")));
    }

    #[test]
    fn completion_during_import_lands_only_after_the_merge() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(12);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        let catalog = ready_catalog(&host, 100);
        let coordinator = ImportCoordinator::new(4, 100_000);
        coordinator.queue_import(id, false);

        // First batch: now Importing.
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Importing));

        let live = key("stub:a/11");
        coordinator.record_completion(id, live.clone());
        assert!(
            !coordinator.is_completed(id, &live),
            "parked completion must not be visible mid-import"
        );

        while coordinator.phase(id) != Some(ImportPhase::Ready) {
            coordinator.tick(&host, &catalog);
        }
        assert!(
            coordinator.is_completed(id, &live),
            "parked completion must survive the terminal merge"
        );
    }

    #[test]
    fn ten_thousand_entries_at_batch_250_take_exactly_forty_ticks() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(10_000);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        let catalog = ready_catalog(&host, 5_000);
        let coordinator = ImportCoordinator::new(250, 200_000);
        coordinator.queue_import(id, false);

        for tick in 1..=39 {
            coordinator.tick(&host, &catalog);
            assert_eq!(
                coordinator.phase(id),
                Some(ImportPhase::Importing),
                "still importing at tick {tick}"
            );
        }
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Ready));

        // No further work: the phase is terminal.
        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Ready));
    }

    #[test]
    fn disconnect_mid_import_stops_early_and_reattach_restarts() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(12);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));
        host.complete(id, key("stub:a/1"));

        let catalog = ready_catalog(&host, 100);
        let coordinator = ImportCoordinator::new(4, 100_000);
        coordinator.queue_import(id, false);

        coordinator.tick(&host, &catalog);
        assert_eq!(coordinator.phase(id), Some(ImportPhase::Importing));

        host.detach(id);
        coordinator.tick(&host, &catalog);
        coordinator.tick(&host, &catalog);
        assert_eq!(
            coordinator.phase(id),
            Some(ImportPhase::Importing),
            "detached entity stays Importing with the walk abandoned"
        );

        host.attached.insert(id);
        while coordinator.phase(id) != Some(ImportPhase::Ready) {
            coordinator.tick(&host, &catalog);
        }
        assert!(coordinator.is_completed(id, &key("stub:a/1")));
    }

    #[test]
    fn import_overrun_aborts_to_not_started() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(150);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        let catalog = ready_catalog(&host, 1_000);
        assert_eq!(catalog.len(), 150);

        let coordinator = ImportCoordinator::new(40, 100);
        coordinator.queue_import(id, false);

        for _ in 0..10 {
            coordinator.tick(&host, &catalog);
        }
        assert_eq!(coordinator.phase(id), Some(ImportPhase::NotStarted));
    }

    #[test]
    fn completion_when_ready_goes_straight_to_completed() {
        let coordinator = ImportCoordinator::new(250, 100_000);
        let id = EntityId::new();
        coordinator.seed_from_store(id, Some("pack:a"));
        coordinator.record_completion(id, key("pack:b"));
        assert!(coordinator.is_completed(id, &key("pack:b")));
        assert_eq!(coordinator.export(id).as_deref(), Some("pack:a,pack:b"));
    }

    #[test]
    fn export_includes_parked_completions() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(12);
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        let catalog = ready_catalog(&host, 100);
        let coordinator = ImportCoordinator::new(4, 100_000);
        coordinator.queue_import(id, false);
        coordinator.tick(&host, &catalog);

        coordinator.record_completion(id, key("pack:live"));
        let payload = coordinator.export(id).unwrap();
        assert!(payload.contains("pack:live"));
    }
}

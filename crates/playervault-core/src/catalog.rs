//! The process-wide achievement catalog and its staged build.
//!
//! The catalog is a lazily, incrementally built ordered list of every
//! achievement/criterion identifier the host runtime knows about. It is
//! built at most once per process lifetime (rebuildable on demand) by
//! walking the host's enumeration one fixed-size batch per tick, so a
//! huge catalog never stalls a tick.
//!
//! Readers may observe the partial list while the build is `Running`;
//! appended identifiers are never removed, so repeated `keys()` calls see
//! a strictly growing, duplicate-free prefix.

use std::collections::HashSet;

use parking_lot::{Mutex, RwLock};
use playervault_types::AchievementKey;
use tracing::{debug, error, info};

use crate::host::Host;
use crate::walker::{BatchWalker, Page, WalkStatus};

/// Build status of the global catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStatus {
    /// No build has run (or the last one was aborted).
    Idle,
    /// A staged build is in progress; `keys()` returns a partial list.
    Running,
    /// The catalog is complete.
    Ready,
}

/// Mutable build state, guarded by one small lock so concurrent
/// `start_build(false)` calls collapse into exactly one build.
struct BuildState {
    status: CatalogStatus,
    walker: Option<BatchWalker>,
    seen: HashSet<AchievementKey>,
}

/// Process-wide, append-only achievement catalog.
pub struct AchievementCatalog {
    keys: RwLock<Vec<AchievementKey>>,
    state: Mutex<BuildState>,
    batch_size: usize,
    ceiling: usize,
}

impl AchievementCatalog {
    /// Create an empty catalog with the given build batch size and hard
    /// enumeration ceiling.
    pub fn new(batch_size: usize, ceiling: usize) -> Self {
        Self {
            keys: RwLock::new(Vec::new()),
            state: Mutex::new(BuildState {
                status: CatalogStatus::Idle,
                walker: None,
                seen: HashSet::new(),
            }),
            batch_size,
            ceiling,
        }
    }

    /// Current build status.
    pub fn status(&self) -> CatalogStatus {
        self.state.lock().status
    }

    /// Number of identifiers accumulated so far.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no identifiers have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// A copy of the identifiers accumulated so far.
    ///
    /// While `Running` this is the partial prefix; callers that need
    /// completeness poll [`status`](Self::status) for `Ready` first.
    pub fn keys(&self) -> Vec<AchievementKey> {
        self.keys.read().clone()
    }

    /// One page of the accumulated list, for the per-entity import walk.
    pub fn page(&self, offset: usize, limit: usize) -> Page<AchievementKey> {
        let keys = self.keys.read();
        let end = offset.saturating_add(limit).min(keys.len());
        Page {
            items: keys.get(offset..end).map(<[AchievementKey]>::to_vec).unwrap_or_default(),
            last: end >= keys.len(),
        }
    }

    /// Request a staged build.
    ///
    /// No-op while a build is `Running`, and when the catalog is `Ready`
    /// unless `force` is set. Otherwise the accumulated list is cleared
    /// and the build starts from the beginning of the host enumeration.
    /// Returns whether a new build was started.
    pub fn start_build(&self, force: bool) -> bool {
        let mut state = self.state.lock();
        match state.status {
            CatalogStatus::Running => false,
            CatalogStatus::Ready if !force => false,
            _ => {
                self.keys.write().clear();
                state.seen.clear();
                state.walker = Some(BatchWalker::new(self.batch_size, self.ceiling));
                state.status = CatalogStatus::Running;
                info!(force, "Catalog build started");
                true
            }
        }
    }

    /// Advance a running build by exactly one batch.
    ///
    /// Called once per tick from the tick loop; does nothing unless a
    /// build is `Running`. On source exhaustion the catalog becomes
    /// `Ready`; hitting the enumeration ceiling aborts the build back to
    /// `Idle` (keeping the partial, append-only list) and logs a critical
    /// diagnostic instead of looping forever.
    pub fn tick_build(&self, host: &dyn Host) {
        let mut state = self.state.lock();
        if state.status != CatalogStatus::Running {
            return;
        }
        let Some(mut walker) = state.walker.take() else {
            state.status = CatalogStatus::Idle;
            return;
        };

        let mut appended = Vec::new();
        let status = walker.step(
            |offset, limit| {
                let items = host.achievement_page(offset, limit);
                Page {
                    last: items.len() < limit,
                    items,
                }
            },
            |key| {
                if state.seen.insert(key.clone()) {
                    appended.push(key);
                }
            },
        );

        if !appended.is_empty() {
            self.keys.write().extend(appended);
        }

        match status {
            WalkStatus::InProgress => {
                state.walker = Some(walker);
                debug!(accumulated = self.len(), "Catalog build batch processed");
            }
            WalkStatus::Finished => {
                state.status = CatalogStatus::Ready;
                info!(total = self.len(), "Catalog build complete");
            }
            WalkStatus::Overrun { processed } => {
                state.status = CatalogStatus::Idle;
                error!(
                    processed,
                    ceiling = self.ceiling,
                    "Catalog enumeration exceeded its hard ceiling; build aborted"
                );
            }
        }
    }
}

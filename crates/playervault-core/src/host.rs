//! The [`Host`] capability seam between Playervault and the engine that
//! owns live entity state.
//!
//! The tick thread is the sole owner of entity mutation. Everything
//! Playervault needs from it -- snapshot capture, attribute application,
//! catalog enumeration, completion checks -- goes through this narrow
//! trait, keeping the core threading-model-agnostic. The concrete engine
//! adapter is one implementation; [`StubHost`] is the in-memory one used
//! by tests and embedding experiments.

use std::collections::{HashMap, HashSet};

use playervault_types::{
    encode_completion_set, AchievementKey, Blob, EntityId, Snapshot,
};
use rust_decimal::Decimal;

/// One apply-to-entity step produced by a load.
///
/// Attribute application mutates live entity state and therefore always
/// runs on the owner thread, one variant per synchronized attribute so a
/// single undecodable attribute can be skipped in isolation.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeApply {
    /// Reposition the entity.
    Position {
        /// World/dimension name.
        world: String,
        /// Spatial X coordinate.
        x: f64,
        /// Spatial Y coordinate.
        y: f64,
        /// Spatial Z coordinate.
        z: f64,
        /// Horizontal facing angle.
        yaw: f64,
        /// Vertical facing angle.
        pitch: f64,
    },
    /// Restore progression counters.
    Experience {
        /// Progression level.
        level: i32,
        /// Fractional progress towards the next level.
        progress: f64,
    },
    /// Restore health.
    Health(f64),
    /// Restore hunger/food level.
    Hunger(i32),
    /// Restore the main inventory payload.
    Inventory(Blob),
    /// Restore the armor payload.
    Armor(Blob),
    /// Restore the off-hand payload.
    Offhand(Blob),
    /// Restore the active effect list.
    Effects(Blob),
    /// Restore the statistics map.
    Statistics(Blob),
    /// Restore the attribute map.
    Attributes(Blob),
    /// Restore the monetary balance.
    Balance(Decimal),
    /// Grant a batch of completed achievements.
    Completions(Vec<AchievementKey>),
}

impl AttributeApply {
    /// Short name of the attribute, used in skip/failure logs.
    pub const fn attribute_name(&self) -> &'static str {
        match self {
            Self::Position { .. } => "position",
            Self::Experience { .. } => "experience",
            Self::Health(_) => "health",
            Self::Hunger(_) => "hunger",
            Self::Inventory(_) => "inventory",
            Self::Armor(_) => "armor",
            Self::Offhand(_) => "offhand",
            Self::Effects(_) => "effects",
            Self::Statistics(_) => "statistics",
            Self::Attributes(_) => "attributes",
            Self::Balance(_) => "balance",
            Self::Completions(_) => "completions",
        }
    }
}

/// Owner-thread capability offered by the engine that runs the tick loop.
///
/// All methods are called from the tick thread only. Implementations must
/// not block: snapshot capture and attribute application are plain memory
/// operations against live entity state.
pub trait Host {
    /// Identities of every currently-attached entity.
    fn attached(&self) -> Vec<EntityId>;

    /// Whether the entity is currently attached.
    fn is_attached(&self, id: EntityId) -> bool;

    /// Capture a consistent point-in-time snapshot of one entity.
    ///
    /// Returns `None` when the entity is not attached or its state cannot
    /// be read; a `None` aborts the persistence attempt.
    fn capture_snapshot(&self, id: EntityId) -> Option<Snapshot>;

    /// Apply one attribute to the live entity. No-op if detached.
    fn apply(&mut self, id: EntityId, apply: AttributeApply);

    /// One page of the external achievement catalog, lazily enumerated.
    ///
    /// Returns at most `limit` keys starting at `offset`; a short page
    /// signals the end of the enumeration.
    fn achievement_page(&self, offset: usize, limit: usize) -> Vec<AchievementKey>;

    /// Whether the entity has completed the given achievement.
    fn has_completed(&self, id: EntityId, key: &AchievementKey) -> bool;
}

/// In-memory [`Host`] for tests and embedding experiments.
///
/// Holds entity snapshots and completion predicates directly; `apply`
/// rebuilds the stored snapshot field by field so a save/load round-trip
/// can be asserted attribute by attribute.
#[derive(Debug, Default)]
pub struct StubHost {
    /// The external achievement catalog, in enumeration order.
    pub achievements: Vec<AchievementKey>,
    /// Per-entity completion predicate backing [`Host::has_completed`].
    pub completions: HashMap<EntityId, HashSet<AchievementKey>>,
    /// Currently-attached entities.
    pub attached: HashSet<EntityId>,
    /// Live entity state, as snapshots.
    pub snapshots: HashMap<EntityId, Snapshot>,
    /// Achievements granted through [`AttributeApply::Completions`].
    pub granted: HashMap<EntityId, Vec<AchievementKey>>,
    /// Names of attributes applied, in application order.
    pub applied_log: Vec<(EntityId, &'static str)>,
}

impl StubHost {
    /// Create an empty stub host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a catalog of `count` distinct keys (`stub:a/{i}`).
    pub fn seeded_catalog(count: usize) -> Vec<AchievementKey> {
        (0..count)
            .filter_map(|i| AchievementKey::parse(&format!("stub:a/{i}")))
            .collect()
    }

    /// Attach an entity with the given live state.
    pub fn attach(&mut self, snapshot: Snapshot) {
        self.attached.insert(snapshot.id);
        self.snapshots.insert(snapshot.id, snapshot);
    }

    /// Detach an entity, keeping its completion predicate.
    pub fn detach(&mut self, id: EntityId) {
        self.attached.remove(&id);
    }

    /// Mark an achievement as completed for the predicate.
    pub fn complete(&mut self, id: EntityId, key: AchievementKey) {
        self.completions.entry(id).or_default().insert(key);
    }
}

impl Host for StubHost {
    fn attached(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.attached.iter().copied().collect();
        ids.sort();
        ids
    }

    fn is_attached(&self, id: EntityId) -> bool {
        self.attached.contains(&id)
    }

    fn capture_snapshot(&self, id: EntityId) -> Option<Snapshot> {
        if !self.attached.contains(&id) {
            return None;
        }
        self.snapshots.get(&id).cloned()
    }

    fn apply(&mut self, id: EntityId, apply: AttributeApply) {
        if !self.attached.contains(&id) {
            return;
        }
        self.applied_log.push((id, apply.attribute_name()));
        let snap = self
            .snapshots
            .entry(id)
            .or_insert_with(|| Snapshot::blank(id, ""));
        match apply {
            AttributeApply::Position {
                world,
                x,
                y,
                z,
                yaw,
                pitch,
            } => {
                snap.world = world;
                snap.x = x;
                snap.y = y;
                snap.z = z;
                snap.yaw = yaw;
                snap.pitch = pitch;
            }
            AttributeApply::Experience { level, progress } => {
                snap.xp_level = level;
                snap.xp_progress = progress;
            }
            AttributeApply::Health(health) => snap.health = health,
            AttributeApply::Hunger(hunger) => snap.hunger = hunger,
            AttributeApply::Inventory(blob) => snap.inventory = blob,
            AttributeApply::Armor(blob) => snap.armor = blob,
            AttributeApply::Offhand(blob) => snap.offhand = blob,
            AttributeApply::Effects(blob) => snap.effects = blob,
            AttributeApply::Statistics(blob) => snap.statistics = blob,
            AttributeApply::Attributes(blob) => snap.attributes = blob,
            AttributeApply::Balance(balance) => snap.balance = balance,
            AttributeApply::Completions(keys) => {
                let granted = self.granted.entry(id).or_default();
                granted.extend(keys);
                snap.completions = encode_completion_set(granted.iter().cloned());
            }
        }
    }

    fn achievement_page(&self, offset: usize, limit: usize) -> Vec<AchievementKey> {
        let end = offset.saturating_add(limit).min(self.achievements.len());
        self.achievements
            .get(offset..end)
            .map(<[AchievementKey]>::to_vec)
            .unwrap_or_default()
    }

    fn has_completed(&self, id: EntityId, key: &AchievementKey) -> bool {
        self.completions
            .get(&id)
            .is_some_and(|set| set.contains(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capture_requires_attachment() {
        let mut host = StubHost::new();
        let id = EntityId::new();
        host.snapshots.insert(id, Snapshot::blank(id, "ghost"));
        assert!(host.capture_snapshot(id).is_none());

        host.attached.insert(id);
        assert!(host.capture_snapshot(id).is_some());
    }

    #[test]
    fn apply_rebuilds_snapshot_fields() {
        let mut host = StubHost::new();
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));

        host.apply(
            id,
            AttributeApply::Position {
                world: "overworld".to_owned(),
                x: 1.0,
                y: 2.0,
                z: 3.0,
                yaw: 90.0,
                pitch: -5.0,
            },
        );
        host.apply(id, AttributeApply::Hunger(17));

        let snap = host.snapshots.get(&id).unwrap();
        assert_eq!(snap.world, "overworld");
        assert_eq!(snap.hunger, 17);
        assert_eq!(host.applied_log.len(), 2);
    }

    #[test]
    fn achievement_page_is_bounded() {
        let mut host = StubHost::new();
        host.achievements = StubHost::seeded_catalog(10);
        assert_eq!(host.achievement_page(0, 4).len(), 4);
        assert_eq!(host.achievement_page(8, 4).len(), 2);
        assert!(host.achievement_page(10, 4).is_empty());
    }

    #[test]
    fn completions_apply_accumulates_grants() {
        let mut host = StubHost::new();
        let id = EntityId::new();
        host.attach(Snapshot::blank(id, "Alice"));
        let keys = StubHost::seeded_catalog(3);
        host.apply(id, AttributeApply::Completions(keys.clone()));
        assert_eq!(host.granted.get(&id).map(Vec::len), Some(3));
        let snap = host.snapshots.get(&id).unwrap();
        assert_eq!(
            snap.completions,
            encode_completion_set(keys.into_iter()),
        );
    }
}

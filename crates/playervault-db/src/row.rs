//! The wide-table row shape and its schema description.
//!
//! One entity maps to exactly one row in `entity_state`; every
//! synchronized attribute is a column. The schema is described here as
//! data so the bootstrap can create missing columns additively and the
//! width-limit handling can name the column that overflowed.

use chrono::{DateTime, Utc};
use playervault_types::{Blob, EntityId, Snapshot};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Name of the wide table.
pub const TABLE: &str = "entity_state";

/// Every column with its SQL type, in table order.
///
/// The bootstrap adds any column missing from an existing table with
/// exactly this type; it never drops or retypes a present column, so an
/// operator-widened column survives restarts.
pub const COLUMN_DEFS: &[(&str, &str)] = &[
    ("id", "UUID PRIMARY KEY"),
    ("name", "VARCHAR(16) NOT NULL DEFAULT ''"),
    ("world", "VARCHAR(64) NOT NULL DEFAULT ''"),
    ("x", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("y", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("z", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("yaw", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("pitch", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("xp_level", "INTEGER NOT NULL DEFAULT 0"),
    ("xp_progress", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("health", "DOUBLE PRECISION NOT NULL DEFAULT 0"),
    ("hunger", "INTEGER NOT NULL DEFAULT 0"),
    ("inventory", "VARCHAR(8192) NOT NULL DEFAULT ''"),
    ("armor", "VARCHAR(2048) NOT NULL DEFAULT ''"),
    ("offhand", "VARCHAR(1024) NOT NULL DEFAULT ''"),
    ("effects", "VARCHAR(2048) NOT NULL DEFAULT ''"),
    ("statistics", "VARCHAR(8192) NOT NULL DEFAULT ''"),
    ("attributes", "VARCHAR(2048) NOT NULL DEFAULT ''"),
    ("completions", "VARCHAR(8192) NOT NULL DEFAULT ''"),
    ("balance", "NUMERIC(18, 2) NOT NULL DEFAULT 0"),
    ("captured_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
    ("server_id", "VARCHAR(64) NOT NULL DEFAULT ''"),
];

/// Text columns with a width limit, and that limit in characters.
///
/// These are the columns eligible for widening when a value overflows.
pub const BOUNDED_COLUMNS: &[(&str, usize)] = &[
    ("name", 16),
    ("world", 64),
    ("inventory", 8192),
    ("armor", 2048),
    ("offhand", 1024),
    ("effects", 2048),
    ("statistics", 8192),
    ("attributes", 2048),
    ("completions", 8192),
    ("server_id", 64),
];

/// Whether `column` is one of the width-limited text columns.
pub fn is_bounded_column(column: &str) -> bool {
    BOUNDED_COLUMNS.iter().any(|(name, _)| *name == column)
}

/// One row of `entity_state`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EntityRow {
    /// Entity identity; the primary key.
    pub id: Uuid,
    /// Display name at capture time.
    pub name: String,
    /// World/dimension name.
    pub world: String,
    /// Spatial X coordinate.
    pub x: f64,
    /// Spatial Y coordinate.
    pub y: f64,
    /// Spatial Z coordinate.
    pub z: f64,
    /// Horizontal facing angle.
    pub yaw: f64,
    /// Vertical facing angle.
    pub pitch: f64,
    /// Progression level counter.
    pub xp_level: i32,
    /// Fractional progress towards the next level.
    pub xp_progress: f64,
    /// Health at capture time.
    pub health: f64,
    /// Hunger/food level at capture time.
    pub hunger: i32,
    /// Serialized main inventory payload.
    pub inventory: String,
    /// Serialized armor payload.
    pub armor: String,
    /// Serialized off-hand payload.
    pub offhand: String,
    /// Serialized active effect list.
    pub effects: String,
    /// Serialized statistics map.
    pub statistics: String,
    /// Serialized attribute map.
    pub attributes: String,
    /// Comma-joined completion-set payload.
    pub completions: String,
    /// Monetary balance.
    pub balance: Decimal,
    /// Capture instant; last-writer-wins tiebreaker.
    pub captured_at: DateTime<Utc>,
    /// Process that wrote this row.
    pub server_id: String,
}

impl EntityRow {
    /// Build a row from a captured snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.into_inner(),
            name: snapshot.name.clone(),
            world: snapshot.world.clone(),
            x: snapshot.x,
            y: snapshot.y,
            z: snapshot.z,
            yaw: snapshot.yaw,
            pitch: snapshot.pitch,
            xp_level: snapshot.xp_level,
            xp_progress: snapshot.xp_progress,
            health: snapshot.health,
            hunger: snapshot.hunger,
            inventory: snapshot.inventory.as_str().to_owned(),
            armor: snapshot.armor.as_str().to_owned(),
            offhand: snapshot.offhand.as_str().to_owned(),
            effects: snapshot.effects.as_str().to_owned(),
            statistics: snapshot.statistics.as_str().to_owned(),
            attributes: snapshot.attributes.as_str().to_owned(),
            completions: snapshot.completions.clone(),
            balance: snapshot.balance,
            captured_at: snapshot.captured_at,
            server_id: snapshot.server_id.clone(),
        }
    }

    /// Rebuild the snapshot this row was written from.
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            id: EntityId::from(self.id),
            name: self.name,
            world: self.world,
            x: self.x,
            y: self.y,
            z: self.z,
            yaw: self.yaw,
            pitch: self.pitch,
            xp_level: self.xp_level,
            xp_progress: self.xp_progress,
            health: self.health,
            hunger: self.hunger,
            inventory: Blob::new(self.inventory),
            armor: Blob::new(self.armor),
            offhand: Blob::new(self.offhand),
            effects: Blob::new(self.effects),
            statistics: Blob::new(self.statistics),
            attributes: Blob::new(self.attributes),
            completions: self.completions,
            balance: self.balance,
            captured_at: self.captured_at,
            server_id: self.server_id,
        }
    }

    /// Value of one bounded text column, by name.
    pub fn bounded_value(&self, column: &str) -> Option<&str> {
        match column {
            "name" => Some(&self.name),
            "world" => Some(&self.world),
            "inventory" => Some(&self.inventory),
            "armor" => Some(&self.armor),
            "offhand" => Some(&self.offhand),
            "effects" => Some(&self.effects),
            "statistics" => Some(&self.statistics),
            "attributes" => Some(&self.attributes),
            "completions" => Some(&self.completions),
            "server_id" => Some(&self.server_id),
            _ => None,
        }
    }

    /// First bounded column whose value exceeds its declared width.
    ///
    /// `PostgreSQL` reports a width overflow (SQLSTATE 22001) without
    /// naming the column, so the engine resolves it from the row it was
    /// trying to write.
    pub fn oversize_column(&self) -> Option<&'static str> {
        BOUNDED_COLUMNS.iter().find_map(|&(column, width)| {
            self.bounded_value(column)
                .is_some_and(|value| value.chars().count() > width)
                .then_some(column)
        })
    }
}

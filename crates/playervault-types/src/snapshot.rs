//! The immutable [`Snapshot`] value object and its supporting types.
//!
//! A snapshot captures every synchronized attribute of one entity at one
//! instant. It is produced exactly once per persistence attempt, on the
//! thread that owns entity mutation, and never modified afterwards -- the
//! worker that performs the store write only ever reads it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// Display identity of an entity: stable key plus human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Stable 128-bit identity, never reused.
    pub id: EntityId,
    /// Display name at the time of reference.
    pub name: String,
}

impl EntityRef {
    /// Create a reference from an identity and name.
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// An opaque serialized payload for one inventory-like container.
///
/// The host runtime owns the encoding (typically base64 or JSON); the
/// persistence layer treats it as text to be stored and returned verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob(String);

impl Blob {
    /// Wrap an already-serialized payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// The serialized payload as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<String> for Blob {
    fn from(payload: String) -> Self {
        Self(payload)
    }
}

impl From<&str> for Blob {
    fn from(payload: &str) -> Self {
        Self(payload.to_owned())
    }
}

/// Immutable point-in-time copy of one entity's synchronized state.
///
/// Built by the owner thread via the host capability, consumed by exactly
/// one persistence attempt, then discarded. Field order mirrors the wide
/// table's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identity of the captured entity.
    pub id: EntityId,
    /// Display name at capture time.
    pub name: String,
    /// Name of the world/dimension the entity occupies.
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
    /// Fractional progress towards the next level, `0.0..1.0`.
    pub xp_progress: f64,
    /// Current health.
    pub health: f64,
    /// Current hunger/food level.
    pub hunger: i32,
    /// Serialized main inventory contents.
    pub inventory: Blob,
    /// Serialized armor contents.
    pub armor: Blob,
    /// Serialized off-hand contents.
    pub offhand: Blob,
    /// Serialized active effect list.
    pub effects: Blob,
    /// Serialized statistics map.
    pub statistics: Blob,
    /// Serialized attribute map.
    pub attributes: Blob,
    /// Comma-joined completion-set payload.
    pub completions: String,
    /// Monetary balance.
    pub balance: Decimal,
    /// Wall-clock instant of capture; last-writer-wins tiebreaker.
    pub captured_at: DateTime<Utc>,
    /// Identifier of the process that produced this snapshot.
    pub server_id: String,
}

impl Snapshot {
    /// A snapshot with every attribute at its default, for an entity that
    /// has no live state yet (e.g. rebuilding from a load).
    pub fn blank(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            world: String::new(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            xp_level: 0,
            xp_progress: 0.0,
            health: 0.0,
            hunger: 0,
            inventory: Blob::default(),
            armor: Blob::default(),
            offhand: Blob::default(),
            effects: Blob::default(),
            statistics: Blob::default(),
            attributes: Blob::default(),
            completions: String::new(),
            balance: Decimal::ZERO,
            captured_at: Utc::now(),
            server_id: String::new(),
        }
    }
}

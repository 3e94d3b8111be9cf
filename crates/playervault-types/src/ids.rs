//! Type-safe entity identity.
//!
//! An entity's identity is an opaque, stable 128-bit key assigned by the
//! host runtime. It is the join key across the cache, the import
//! coordinator, and the store's wide table, and is never reused across
//! different real-world participants. The newtype keeps it from being mixed
//! up with other [`Uuid`] values at compile time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, stable identifier for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new identifier using UUID v7 (time-ordered).
    ///
    /// Real identities come from the host runtime; this constructor exists
    /// for tests and seed data.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Build an identifier from a raw 128-bit value.
    pub const fn from_u128(raw: u128) -> Self {
        Self(Uuid::from_u128(raw))
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

//! Identity types for mediated entities.
//!
//! - `EntityId` is the stable storage id, assigned on insert and never reused.
//! - `EntityType` names a persisted table / aggregate class.
//! - `EntityState` tells the ledger which bucket an entity's change belongs in.

use std::fmt;

/// Stable identifier of a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Create a new EntityId from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Name of an entity type (one table, one class of records).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Where an entity stood when its write completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Inserted by the write.
    Created,
    /// Updated in place.
    Altered(EntityId),
    /// Removed by the write.
    Destroyed(EntityId),
}

impl EntityState {
    /// The id the entity had before the write, if any.
    pub fn id(&self) -> Option<EntityId> {
        match self {
            EntityState::Created => None,
            EntityState::Altered(id) | EntityState::Destroyed(id) => Some(*id),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EntityState::Created)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, EntityState::Destroyed(_))
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Created => write!(f, "created"),
            EntityState::Altered(id) => write!(f, "altered {}", id),
            EntityState::Destroyed(id) => write!(f, "destroyed {}", id),
        }
    }
}

//! Store error types.

use keystone_core::{EntityId, EntityType, MediationError};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("{entity_type} {id} not found")]
    RowNotFound { entity_type: EntityType, id: EntityId },

    /// Optimistic lock check failed.
    #[error("stale {entity_type} {id}: expected version {expected}, found {found}")]
    StaleObject {
        entity_type: EntityType,
        id: EntityId,
        expected: u64,
        found: u64,
    },

    /// Commit or rollback without a matching begin.
    #[error("no unit of work is active")]
    NoActiveUnitOfWork,

    /// An inner unit rolled back, so the outer one could not commit.
    #[error("unit of work rolled back")]
    RolledBack,

    /// The record has not been inserted yet.
    #[error("{entity_type} has not been saved")]
    NotPersisted { entity_type: EntityType },

    /// The record was already destroyed.
    #[error("{entity_type} {id} has been destroyed")]
    Destroyed { entity_type: EntityType, id: EntityId },

    /// A counter column holds a non-integer value.
    #[error("{attr} on {entity_type} {id} is not a counter")]
    NotACounter {
        entity_type: EntityType,
        id: EntityId,
        attr: String,
    },
}

impl StoreError {
    pub fn row_not_found(entity_type: EntityType, id: EntityId) -> Self {
        Self::RowNotFound { entity_type, id }
    }

    pub fn stale_object(entity_type: EntityType, id: EntityId, expected: u64, found: u64) -> Self {
        Self::StaleObject {
            entity_type,
            id,
            expected,
            found,
        }
    }
}

impl From<StoreError> for MediationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleObject {
                entity_type,
                id,
                expected,
                found,
            } => MediationError::stale_version(entity_type, id, expected, found),
            other => MediationError::storage(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

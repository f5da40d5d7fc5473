//! Error taxonomy shared by every keystone crate.

use crate::{EntityId, EntityType, Phase};
use thiserror::Error;

/// Errors raised by the mediation coordinator.
#[derive(Debug, Error)]
pub enum MediationError {
    /// The type handed to the coordinator was never registered as a mediated root.
    #[error("{type_name} has not been registered for mediation")]
    InvalidAggregate { type_name: String },

    /// Mediation nested past the configured limit on one thread.
    #[error(
        "runaway mediation on {entity_type} ({depth} nested calls, limit {limit}){}",
        runaway_hint(.persisted)
    )]
    RunawayRecursion {
        entity_type: EntityType,
        depth: usize,
        limit: usize,
        persisted: bool,
    },

    /// The persisted version moved underneath the mediated transaction.
    #[error("stale {entity_type} {id}: expected version {expected}, found {found}")]
    StaleVersion {
        entity_type: EntityType,
        id: EntityId,
        expected: u64,
        found: u64,
    },

    /// A state machine event fired from a state that does not accept it.
    #[error("cannot {transition} from {from}")]
    InvalidTransition {
        from: &'static str,
        transition: &'static str,
    },

    /// A storage primitive failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// A phase callback failed.
    #[error("{phase} callback failed: {message}")]
    Callback { phase: Phase, message: String },

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A dependent was routed to a root that does not declare it.
    #[error("{dependent} is not a declared dependent of {root}")]
    UnknownDependent {
        root: EntityType,
        dependent: EntityType,
    },
}

impl MediationError {
    pub fn invalid_aggregate(type_name: impl Into<String>) -> Self {
        Self::InvalidAggregate {
            type_name: type_name.into(),
        }
    }

    pub fn stale_version(entity_type: EntityType, id: EntityId, expected: u64, found: u64) -> Self {
        Self::StaleVersion {
            entity_type,
            id,
            expected,
            found,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn callback(phase: Phase, message: impl Into<String>) -> Self {
        Self::Callback {
            phase,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Attribute a host failure raised inside a phase callback to `phase`.
    ///
    /// Storage and configuration failures become `Callback`; everything
    /// the coordinator itself raises is left as is.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Self::Storage { message } | Self::Configuration { message } => {
                Self::callback(phase, message)
            }
            other => other,
        }
    }

    /// True for conflicts a caller may resolve by reloading and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleVersion { .. })
    }
}

fn runaway_hint(persisted: &bool) -> &'static str {
    if *persisted {
        ""
    } else {
        "; mediation was probably started from a pre-insert hook before the instance had an id"
    }
}

/// Result type for mediation operations.
pub type MediationResult<T> = Result<T, MediationError>;

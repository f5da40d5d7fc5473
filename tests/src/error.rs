//! Fixture error type.

use keystone_core::MediationError;
use keystone_mediator::RegistryError;
use keystone_store::StoreError;
use thiserror::Error;

/// Errors raised by fixture operations.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mediation(#[from] MediationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Raised by test operations to force a rollback.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl FixtureError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// True for an optimistic-lock conflict from either layer.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::Mediation(MediationError::StaleVersion { .. })
                | Self::Store(StoreError::StaleObject { .. })
        )
    }
}

impl From<FixtureError> for MediationError {
    fn from(err: FixtureError) -> Self {
        match err {
            FixtureError::Store(err) => err.into(),
            FixtureError::Mediation(err) => err,
            FixtureError::Registry(err) => MediationError::configuration(err.to_string()),
            FixtureError::Aborted(reason) => MediationError::storage(reason),
        }
    }
}

/// Result type for fixture operations.
pub type FixtureResult<T> = Result<T, FixtureError>;

//! Mediator states and the events that move between them.

use keystone_core::{MediationError, MediationResult};
use std::fmt;

/// Where a mediator is in its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediatorState {
    /// No transaction in progress.
    #[default]
    Idle,
    /// Running the operation and the reconcile/cache phases.
    Mediating,
    /// Applying the single version bump.
    Versioning,
    /// Running the operation with mediation switched off.
    Disabled,
}

/// State machine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// idle -> mediating
    Start,
    /// mediating -> versioning
    Bump,
    /// idle -> disabled
    Disable,
    /// any -> idle
    Done,
}

impl MediatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediatorState::Idle => "idle",
            MediatorState::Mediating => "mediating",
            MediatorState::Versioning => "versioning",
            MediatorState::Disabled => "disabled",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, MediatorState::Idle)
    }

    /// The state after `transition`, if this state accepts it.
    pub fn apply(self, transition: Transition) -> MediationResult<MediatorState> {
        use MediatorState::*;

        match (self, transition) {
            (Idle, Transition::Start) => Ok(Mediating),
            (Mediating, Transition::Bump) => Ok(Versioning),
            (Idle, Transition::Disable) => Ok(Disabled),
            (_, Transition::Done) => Ok(Idle),
            (from, transition) => Err(MediationError::InvalidTransition {
                from: from.as_str(),
                transition: transition.as_str(),
            }),
        }
    }

    pub fn can_apply(self, transition: Transition) -> bool {
        self.apply(transition).is_ok()
    }
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Bump => "bump",
            Transition::Disable => "disable",
            Transition::Done => "done",
        }
    }
}

impl fmt::Display for MediatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

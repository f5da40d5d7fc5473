//! Optimistic-lock cooperation.
//!
//! While a root is mediated, per-row writes to it skip the version check so
//! the transaction bumps the version exactly once, in the `versioning`
//! state. Outside mediation locking behaves as usual.

use std::rc::Rc;

use keystone_core::{Aggregate, EntityId, Locking};

use crate::context::MediationContext;
use crate::state::MediatorState;

/// Answers whether a write must run the optimistic check.
#[derive(Debug, Clone, Copy)]
pub struct VersioningGuard<'a> {
    ctx: &'a MediationContext,
}

impl<'a> VersioningGuard<'a> {
    pub fn new(ctx: &'a MediationContext) -> Self {
        Self { ctx }
    }

    /// Locking for a write to `root` itself.
    ///
    /// Optimistic outside mediation and in disabled runs; during a mediated
    /// run only while versioning.
    pub fn locking_for<R: Aggregate>(&self, root: &Rc<R>) -> Locking {
        match self.ctx.current_state(root) {
            None
            | Some(MediatorState::Idle)
            | Some(MediatorState::Disabled)
            | Some(MediatorState::Versioning) => Locking::Optimistic,
            Some(MediatorState::Mediating) => Locking::Skip,
        }
    }

    /// Locking for a counter-cache update on root `id`: skipped while that
    /// id is being mediated on this thread.
    pub fn counter_locking_for<R: Aggregate>(&self, id: EntityId) -> Locking {
        if self.ctx.registry().contains_id::<R>(id) {
            Locking::Skip
        } else {
            Locking::Optimistic
        }
    }
}

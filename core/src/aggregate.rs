//! Traits the host persistence layer implements so its records can be
//! mediated, plus the small shared vocabulary (phases, locking, outcomes).

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::{ChangeSet, EntityId, EntityType, MediationResult};

/// A record whose writes are folded into the change ledger.
pub trait Tracked {
    /// The record's type.
    fn entity_type(&self) -> EntityType;

    /// The storage id, or `None` before the first insert.
    fn entity_id(&self) -> Option<EntityId>;

    /// True until the record has been inserted.
    fn is_new(&self) -> bool {
        self.entity_id().is_none()
    }

    /// Attribute deltas not yet written to storage.
    fn pending_changes(&self) -> ChangeSet;
}

/// The root of a graph of records whose writes are coordinated together.
///
/// The coordinator holds roots as `Rc<Self>`; identity before the first
/// insert is pointer identity of that `Rc`.
pub trait Aggregate: Tracked + 'static {
    /// Instance-level mediation override.
    fn mediation_switch(&self) -> &MediationSwitch;

    /// The optimistic-lock version loaded into memory, if the type is versioned.
    fn lock_version(&self) -> Option<u64> {
        None
    }

    /// Refresh the in-memory state from storage.
    fn reload(&self) -> MediationResult<()> {
        Ok(())
    }

    /// True once the root has been removed from storage.
    fn is_destroyed(&self) -> bool {
        false
    }
}

/// A record whose writes route mediation through a root.
pub trait Dependent: Tracked {
    type Root: Aggregate;

    /// The root accessor; `None` for an unattached dependent.
    fn root(&self) -> Option<Rc<Self::Root>>;
}

/// The storage layer's begin/commit/rollback primitives.
///
/// Nested `begin` calls join the unit already open on the connection.
pub trait UnitOfWork {
    fn begin(&self) -> MediationResult<()>;
    fn commit(&self) -> MediationResult<()>;
    fn rollback(&self) -> MediationResult<()>;
}

/// Per-instance enable/disable flag. Unset defers to the class setting.
#[derive(Debug, Default)]
pub struct MediationSwitch(Cell<Option<bool>>);

impl MediationSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<bool> {
        self.0.get()
    }

    pub fn set(&self, value: Option<bool>) {
        self.0.set(value);
    }

    pub fn enable(&self) {
        self.set(Some(true));
    }

    pub fn disable(&self) {
        self.set(Some(false));
    }
}

/// Hook points run once per outermost mediation, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    Reconcile,
    Cache,
    Bump,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::Reconcile => "reconcile",
            Phase::Cache => "cache",
            Phase::Bump => "bump",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a write must run the optimistic-lock check and increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locking {
    /// Compare the loaded version and increment it.
    Optimistic,
    /// Write without touching the version column.
    Skip,
}

impl Locking {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Locking::Optimistic)
    }
}

/// Result of a wrapped operation, as seen by the coordinator.
///
/// A failed outcome (a save that did not pass validation) is returned to
/// the caller normally but stops the post-write phases.
pub trait Outcome {
    fn is_failure(&self) -> bool;
}

impl Outcome for () {
    fn is_failure(&self) -> bool {
        false
    }
}

impl Outcome for bool {
    fn is_failure(&self) -> bool {
        !*self
    }
}

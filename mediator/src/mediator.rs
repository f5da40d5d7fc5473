//! The per-aggregate mediator.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use keystone_core::{
    Aggregate, ChangeSet, EntityId, EntityState, EntityType, MediationError, MediationResult,
    Outcome, Phase, Tracked,
};
use keystone_ledger::ChangeLedger;
use tracing::{debug, warn};

use crate::context::MediationContext;
use crate::state::{MediatorState, Transition};
use crate::types::MediatedType;

/// State machine bound to one root instance for the length of one logical
/// transaction.
///
/// The outermost `mediate` call drives before -> operation -> reconcile ->
/// refresh -> cache -> bump; nested calls only run their operation.
pub struct Mediator<R: Aggregate> {
    root: Rc<R>,
    def: Arc<MediatedType<R>>,
    state: Cell<MediatorState>,
    /// Open `mediate` frames on this mediator.
    depth: Cell<usize>,
    ledger: RefCell<ChangeLedger>,
    /// Whether the current run is mediated or disabled.
    enabled: Cell<bool>,
    /// Root version when the current run started.
    started_version: Cell<Option<u64>>,
}

impl<R: Aggregate> Mediator<R> {
    pub(crate) fn new(root: Rc<R>, def: Arc<MediatedType<R>>) -> Self {
        Self {
            root,
            def,
            state: Cell::new(MediatorState::Idle),
            depth: Cell::new(0),
            ledger: RefCell::new(ChangeLedger::new()),
            enabled: Cell::new(false),
            started_version: Cell::new(None),
        }
    }

    // ========== Accessors ==========

    pub fn root(&self) -> &Rc<R> {
        &self.root
    }

    pub fn entity_type(&self) -> &EntityType {
        self.def.name()
    }

    /// The bound instance's id, once it has one.
    pub fn mediated_id(&self) -> Option<EntityId> {
        self.root.entity_id()
    }

    pub fn state(&self) -> MediatorState {
        self.state.get()
    }

    pub fn is_idle(&self) -> bool {
        self.state.get().is_idle()
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// True while running a mediated (not disabled) transaction.
    pub fn is_enabled(&self) -> bool {
        self.enabled.get() && !self.is_idle()
    }

    /// Snapshot of the changes recorded so far.
    pub fn changes(&self) -> ChangeLedger {
        self.ledger.borrow().clone()
    }

    /// Query the ledger without copying it.
    pub fn with_changes<T>(&self, f: impl FnOnce(&ChangeLedger) -> T) -> T {
        f(&self.ledger.borrow())
    }

    // ========== Change tracking ==========

    /// Fold one entity's change set into the ledger. Ignored unless a
    /// mediated transaction is running.
    pub fn track(&self, entity_type: EntityType, state: EntityState, changes: ChangeSet) {
        if self.is_enabled() {
            self.ledger.borrow_mut().track(entity_type, state, changes);
        }
    }

    /// Track an entity's unsaved changes as they stand now.
    pub fn track_changes_for<T: Tracked + ?Sized>(&self, entity: &T) {
        let state = match entity.entity_id() {
            Some(id) => EntityState::Altered(id),
            None => EntityState::Created,
        };
        self.track(entity.entity_type(), state, entity.pending_changes());
    }

    // ========== Mediation ==========

    /// Run `op` inside this mediator.
    ///
    /// Depth bookkeeping runs on every exit path; when the outermost frame
    /// closes the mediator is forced idle and released from the context.
    pub(crate) fn mediate<T, E>(
        self: &Rc<Self>,
        ctx: &MediationContext,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Outcome,
        E: From<MediationError>,
    {
        let _frame = Frame::enter(ctx, self);
        debug!(
            entity_type = %self.entity_type(),
            id = ?self.mediated_id(),
            depth = self.depth(),
            state = %self.state(),
            "mediate"
        );

        if self.is_idle() {
            self.begin_transaction(ctx, op)
        } else {
            op()
        }
    }

    fn begin_transaction<T, E>(
        &self,
        ctx: &MediationContext,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Outcome,
        E: From<MediationError>,
    {
        let enabled = ctx.mediation_enabled(&self.root, &self.def);
        self.enabled.set(enabled);

        let result = if enabled {
            self.fire(Transition::Start)?;
            *self.ledger.borrow_mut() = ChangeLedger::new();
            self.started_version.set(self.root.lock_version());
            self.run_in_unit_of_work(ctx, op)?
        } else {
            self.fire(Transition::Disable)?;
            op()?
        };

        self.fire(Transition::Done)?;
        Ok(result)
    }

    fn run_in_unit_of_work<T, E>(
        &self,
        ctx: &MediationContext,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Outcome,
        E: From<MediationError>,
    {
        let Some(unit) = ctx.unit_of_work() else {
            return self.run_with_phases(ctx, op);
        };

        unit.begin()?;
        match self.run_with_phases(ctx, op) {
            Ok(result) if result.is_failure() => {
                unit.rollback()?;
                Ok(result)
            }
            Ok(result) => {
                unit.commit()?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback) = unit.rollback() {
                    warn!(error = %rollback, "rollback after failed mediation also failed");
                }
                Err(err)
            }
        }
    }

    fn run_with_phases<T, E>(
        &self,
        ctx: &MediationContext,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Outcome,
        E: From<MediationError>,
    {
        self.run_phase(ctx, Phase::Before)?;

        let result = op()?;
        if result.is_failure() {
            debug!(entity_type = %self.entity_type(), "operation failed; post-write phases skipped");
            return Ok(result);
        }

        if self.run_phase(ctx, Phase::Reconcile)? > 0 {
            self.refresh()?;
        }
        self.run_phase(ctx, Phase::Cache)?;
        self.bump(ctx)?;

        Ok(result)
    }

    /// Run a phase's callbacks in order. Returns how many ran.
    ///
    /// Host failures come back tagged with the phase; coordinator errors
    /// such as a stale version pass through unchanged.
    fn run_phase(&self, ctx: &MediationContext, phase: Phase) -> MediationResult<usize> {
        let callbacks = self.def.callbacks(phase);
        if !callbacks.is_empty() {
            debug!(entity_type = %self.entity_type(), %phase, count = callbacks.len(), "phase");
        }
        for callback in callbacks {
            callback(&self.root, ctx).map_err(|err| err.in_phase(phase))?;
        }
        Ok(callbacks.len())
    }

    /// Reload the root and fail if its version moved since the run started.
    fn refresh(&self) -> MediationResult<()> {
        if self.root.is_new() || self.root.is_destroyed() {
            return Ok(());
        }
        self.root.reload()?;

        if let (Some(expected), Some(found), Some(id)) = (
            self.started_version.get(),
            self.root.lock_version(),
            self.mediated_id(),
        ) {
            if expected != found {
                warn!(
                    entity_type = %self.entity_type(),
                    %id,
                    expected,
                    found,
                    "stale version detected on refresh"
                );
                return Err(MediationError::stale_version(
                    self.entity_type().clone(),
                    id,
                    expected,
                    found,
                ));
            }
        }
        Ok(())
    }

    /// Enter `versioning` and apply the single bump.
    fn bump(&self, ctx: &MediationContext) -> MediationResult<()> {
        self.fire(Transition::Bump)?;
        if self.root.is_new() || self.root.is_destroyed() {
            return Ok(());
        }
        if self.run_phase(ctx, Phase::Bump)? > 0 {
            self.root.reload()?;
        }
        Ok(())
    }

    fn fire(&self, transition: Transition) -> MediationResult<()> {
        let next = self.state.get().apply(transition)?;
        self.state.set(next);
        Ok(())
    }

    fn force_idle(&self) {
        self.state.set(MediatorState::Idle);
        self.enabled.set(false);
        self.started_version.set(None);
    }
}

impl<R: Aggregate> fmt::Debug for Mediator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("entity_type", self.entity_type())
            .field("id", &self.mediated_id())
            .field("state", &self.state.get())
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// One open `mediate` call. Dropping it closes the frame.
struct Frame<'a, R: Aggregate> {
    ctx: &'a MediationContext,
    mediator: &'a Rc<Mediator<R>>,
}

impl<'a, R: Aggregate> Frame<'a, R> {
    fn enter(ctx: &'a MediationContext, mediator: &'a Rc<Mediator<R>>) -> Self {
        mediator.depth.set(mediator.depth.get() + 1);
        ctx.enter_frame();
        Self { ctx, mediator }
    }
}

impl<R: Aggregate> Drop for Frame<'_, R> {
    fn drop(&mut self) {
        self.ctx.leave_frame();
        let depth = self.mediator.depth.get().saturating_sub(1);
        self.mediator.depth.set(depth);
        if depth == 0 {
            self.mediator.force_idle();
            self.ctx.registry().release(self.mediator);
            debug!(
                entity_type = %self.mediator.entity_type(),
                id = ?self.mediator.mediated_id(),
                "mediation finished"
            );
        }
    }
}

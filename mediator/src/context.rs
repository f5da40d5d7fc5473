//! The per-thread mediation context.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use keystone_core::{
    Aggregate, ChangeSet, EntityId, EntityState, EntityType, MediationError, Outcome, UnitOfWork,
};
use keystone_ledger::ChangeLedger;
use tracing::warn;

use crate::config::MediationConfig;
use crate::mediator::Mediator;
use crate::registry::MediatorRegistry;
use crate::state::MediatorState;
use crate::types::{MediatedType, TypeRegistry};
use crate::versioning::VersioningGuard;

/// Everything one thread needs to mediate: the shared type definitions,
/// its own mediator registry and the unit of work its writes go through.
///
/// A context is built per thread and is not `Send`; two threads working
/// on the same aggregate id get independent mediators.
pub struct MediationContext {
    types: Arc<TypeRegistry>,
    config: MediationConfig,
    registry: MediatorRegistry,
    unit_of_work: Option<Rc<dyn UnitOfWork>>,
    /// Open `mediate` frames on this thread, across all mediators.
    depth: Cell<usize>,
}

impl MediationContext {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            config: MediationConfig::default(),
            registry: MediatorRegistry::new(),
            unit_of_work: None,
            depth: Cell::new(0),
        }
    }

    pub fn with_config(mut self, config: MediationConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every outermost mediated transaction inside `unit`.
    pub fn with_unit_of_work(mut self, unit: Rc<dyn UnitOfWork>) -> Self {
        self.unit_of_work = Some(unit);
        self
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn config(&self) -> &MediationConfig {
        &self.config
    }

    pub fn registry(&self) -> &MediatorRegistry {
        &self.registry
    }

    pub(crate) fn unit_of_work(&self) -> Option<&Rc<dyn UnitOfWork>> {
        self.unit_of_work.as_ref()
    }

    /// Open `mediate` frames on this thread.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn enter_frame(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    pub(crate) fn leave_frame(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    /// The type definition for `R`.
    pub fn definition<R: Aggregate>(&self) -> Result<Arc<MediatedType<R>>, MediationError> {
        self.types
            .get::<R>()
            .ok_or_else(|| MediationError::invalid_aggregate(std::any::type_name::<R>()))
    }

    /// Instance override if set, else global and class switches together.
    pub fn mediation_enabled<R: Aggregate>(&self, root: &Rc<R>, def: &MediatedType<R>) -> bool {
        root.mediation_switch()
            .get()
            .unwrap_or_else(|| self.config.enabled && def.mediation_enabled())
    }

    // ========== Mediation ==========

    /// Run `op` as (part of) the mediated transaction on `root`.
    ///
    /// The outermost call on a root runs the phases; calls nested inside it,
    /// on this root or on the same persisted id, just run `op`.
    pub fn mediate<R, T, E>(&self, root: &Rc<R>, op: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        R: Aggregate,
        T: Outcome,
        E: From<MediationError>,
    {
        let def = self.definition::<R>()?;

        let depth = self.depth.get() + 1;
        if depth > self.config.max_nesting_depth {
            let err = MediationError::RunawayRecursion {
                entity_type: def.name().clone(),
                depth,
                limit: self.config.max_nesting_depth,
                persisted: !root.is_new(),
            };
            warn!(entity_type = %def.name(), depth, "runaway mediation cut off");
            return Err(err.into());
        }

        let mediator = self.registry.get_or_create(root, &def);
        mediator.mediate(self, op)
    }

    /// Record a change against `root`'s running transaction. A no-op when
    /// nothing is being mediated for `root`.
    pub fn track<R: Aggregate>(
        &self,
        root: &Rc<R>,
        entity_type: EntityType,
        state: EntityState,
        changes: ChangeSet,
    ) {
        if let Some(mediator) = self.current_mediator(root) {
            mediator.track(entity_type, state, changes);
        }
    }

    // ========== Introspection ==========

    pub fn current_mediator<R: Aggregate>(&self, root: &Rc<R>) -> Option<Rc<Mediator<R>>> {
        self.registry.find(root)
    }

    pub fn currently_mediating<R: Aggregate>(&self, root: &Rc<R>) -> bool {
        self.current_mediator(root).is_some()
    }

    pub fn current_state<R: Aggregate>(&self, root: &Rc<R>) -> Option<MediatorState> {
        self.current_mediator(root).map(|mediator| mediator.state())
    }

    /// Snapshot of the running transaction's ledger.
    pub fn mediated_changes<R: Aggregate>(&self, root: &Rc<R>) -> Option<ChangeLedger> {
        self.current_mediator(root).map(|mediator| mediator.changes())
    }

    /// The first of `ids` with a running mediation on this thread.
    pub fn currently_mediating_ids<R: Aggregate>(
        &self,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Option<EntityId> {
        ids.into_iter().find(|id| self.registry.contains_id::<R>(*id))
    }

    /// Lock decisions for writes made under this context.
    pub fn versioning(&self) -> VersioningGuard<'_> {
        VersioningGuard::new(self)
    }
}

impl fmt::Debug for MediationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediationContext")
            .field("types", &self.types)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("depth", &self.depth.get())
            .finish()
    }
}

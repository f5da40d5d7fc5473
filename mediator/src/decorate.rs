//! Entry-point wrappers.
//!
//! Host persistence code calls these around its own save/destroy/bulk
//! operations instead of `mediate` directly; they route dependents to
//! their root and feed the ledger.

use std::rc::Rc;

use keystone_core::{
    Aggregate, ChangeSet, Dependent, EntityState, MediationError, MediationSwitch, Outcome,
    Tracked,
};

use crate::context::MediationContext;

impl MediationContext {
    /// Mediate a save of `entity` (the root itself or one of its dependents).
    ///
    /// The entity's pending changes are captured before the write and
    /// tracked once it succeeds: under `created` if it was new, else under
    /// its id. Saves with nothing pending are not tracked.
    pub fn mediated_save<R, D, T, E>(
        &self,
        root: &Rc<R>,
        entity: &D,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        R: Aggregate,
        D: Tracked + ?Sized,
        T: Outcome,
        E: From<MediationError>,
    {
        self.mediate(root, || {
            let was_new = entity.is_new();
            let changes = entity.pending_changes();

            let result = op()?;
            if result.is_failure() {
                return Ok(result);
            }

            match (was_new, entity.entity_id()) {
                (false, Some(id)) if !changes.is_empty() => {
                    self.track(root, entity.entity_type(), EntityState::Altered(id), changes);
                }
                (false, _) => {}
                (true, _) => self.track(root, entity.entity_type(), EntityState::Created, changes),
            }
            Ok(result)
        })
    }

    /// Mediate a destroy of `entity`, tracking its id under `destroyed`.
    pub fn mediated_destroy<R, D, T, E>(
        &self,
        root: &Rc<R>,
        entity: &D,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        R: Aggregate,
        D: Tracked + ?Sized,
        T: Outcome,
        E: From<MediationError>,
    {
        self.mediate(root, || {
            let id = entity.entity_id();

            let result = op()?;
            if let (false, Some(id)) = (result.is_failure(), id) {
                self.track(
                    root,
                    entity.entity_type(),
                    EntityState::Destroyed(id),
                    ChangeSet::new(),
                );
            }
            Ok(result)
        })
    }

    /// Mediate a custom bulk operation on `root` without tracking.
    pub fn mediated_transaction<R, T, E>(
        &self,
        root: &Rc<R>,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        R: Aggregate,
        T: Outcome,
        E: From<MediationError>,
    {
        self.mediate(root, op)
    }

    /// Save a dependent through its root. Unattached dependents are saved
    /// unmediated.
    pub fn save_through<D, T, E>(&self, dependent: &D, op: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        D: Dependent + ?Sized,
        T: Outcome,
        E: From<MediationError>,
    {
        match self.route::<D>(dependent)? {
            Some(root) => self.mediated_save(&root, dependent, op),
            None => op(),
        }
    }

    /// Destroy a dependent through its root. Unattached dependents are
    /// destroyed unmediated.
    pub fn destroy_through<D, T, E>(
        &self,
        dependent: &D,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        D: Dependent + ?Sized,
        T: Outcome,
        E: From<MediationError>,
    {
        match self.route::<D>(dependent)? {
            Some(root) => self.mediated_destroy(&root, dependent, op),
            None => op(),
        }
    }

    /// The dependent's root, checking the root declares it.
    fn route<D: Dependent + ?Sized>(
        &self,
        dependent: &D,
    ) -> Result<Option<Rc<D::Root>>, MediationError> {
        let Some(root) = dependent.root() else {
            return Ok(None);
        };
        let def = self.definition::<D::Root>()?;
        let entity_type = dependent.entity_type();
        if !def.declares_dependent(&entity_type) {
            return Err(MediationError::UnknownDependent {
                root: def.name().clone(),
                dependent: entity_type,
            });
        }
        Ok(Some(root))
    }
}

/// Run `op` with mediation switched off on `root`, restoring the previous
/// instance setting afterwards, even if `op` panics.
pub fn without_mediation<R, T>(root: &R, op: impl FnOnce() -> T) -> T
where
    R: Aggregate + ?Sized,
{
    let _restore = Restore::disable(root.mediation_switch());
    op()
}

struct Restore<'a> {
    switch: &'a MediationSwitch,
    previous: Option<bool>,
}

impl<'a> Restore<'a> {
    fn disable(switch: &'a MediationSwitch) -> Self {
        let previous = switch.get();
        switch.disable();
        Self { switch, previous }
    }
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        self.switch.set(self.previous);
    }
}

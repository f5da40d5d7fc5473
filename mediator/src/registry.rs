//! Per-thread lookup from root instance to its active mediator.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use keystone_core::{Aggregate, EntityId};
use tracing::debug;

use crate::mediator::Mediator;
use crate::types::MediatedType;

/// Active mediators of one root type.
struct TypeSlots<R: Aggregate> {
    /// Mediators of persisted roots.
    by_id: HashMap<EntityId, Rc<Mediator<R>>>,
    /// Mediators of roots that had no id when mediation started.
    fresh: Vec<Rc<Mediator<R>>>,
}

impl<R: Aggregate> Default for TypeSlots<R> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            fresh: Vec::new(),
        }
    }
}

impl<R: Aggregate> TypeSlots<R> {
    /// By id first, then the fresh list by identity or by a just-assigned
    /// id. A fresh mediator whose root now has an id moves to `by_id`.
    fn find(&mut self, root: &Rc<R>) -> Option<Rc<Mediator<R>>> {
        let id = root.entity_id();
        if let Some(mediator) = id.and_then(|id| self.by_id.get(&id)) {
            return Some(Rc::clone(mediator));
        }

        let pos = self.fresh.iter().position(|mediator| {
            Rc::ptr_eq(mediator.root(), root) || (id.is_some() && mediator.mediated_id() == id)
        })?;
        let mediator = Rc::clone(&self.fresh[pos]);
        self.promote(pos);
        Some(mediator)
    }

    fn promote(&mut self, pos: usize) {
        let Some(id) = self.fresh[pos].mediated_id() else {
            return;
        };
        let mediator = self.fresh.remove(pos);
        debug!(entity_type = %mediator.entity_type(), %id, "promoted new-record mediator");
        self.by_id.insert(id, mediator);
    }

    fn contains_id(&self, id: EntityId) -> bool {
        self.by_id.contains_key(&id)
            || self
                .fresh
                .iter()
                .any(|mediator| mediator.mediated_id() == Some(id))
    }

    fn remove(&mut self, mediator: &Rc<Mediator<R>>) {
        self.by_id.retain(|_, held| !Rc::ptr_eq(held, mediator));
        self.fresh.retain(|held| !Rc::ptr_eq(held, mediator));
    }

    fn len(&self) -> usize {
        self.by_id.len() + self.fresh.len()
    }
}

/// The mediators active on the owning thread, per root type.
///
/// At most one mediator exists per root identity: the id once persisted,
/// the `Rc` allocation before that. Mediators leave as soon as they return
/// to idle.
#[derive(Default)]
pub struct MediatorRegistry {
    slots: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

impl MediatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active mediator for `root`, if any.
    pub fn find<R: Aggregate>(&self, root: &Rc<R>) -> Option<Rc<Mediator<R>>> {
        let mut slots = self.slots.borrow_mut();
        slots
            .get_mut(&TypeId::of::<R>())
            .and_then(|slot| slot.downcast_mut::<TypeSlots<R>>())
            .and_then(|slot| slot.find(root))
    }

    /// The active mediator for `root`, creating one if none exists.
    pub(crate) fn get_or_create<R: Aggregate>(
        &self,
        root: &Rc<R>,
        def: &Arc<MediatedType<R>>,
    ) -> Rc<Mediator<R>> {
        let mut slots = self.slots.borrow_mut();
        let entry = slots
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(TypeSlots::<R>::default()));
        let Some(slot) = entry.downcast_mut::<TypeSlots<R>>() else {
            // Keys are derived from the slot type, so this cannot miss.
            return Rc::new(Mediator::new(Rc::clone(root), Arc::clone(def)));
        };

        if let Some(mediator) = slot.find(root) {
            return mediator;
        }

        let mediator = Rc::new(Mediator::new(Rc::clone(root), Arc::clone(def)));
        match root.entity_id() {
            Some(id) => {
                slot.by_id.insert(id, Rc::clone(&mediator));
            }
            None => slot.fresh.push(Rc::clone(&mediator)),
        }
        debug!(entity_type = %def.name(), id = ?root.entity_id(), "created mediator");
        mediator
    }

    /// Drop a mediator from whichever collection holds it.
    pub(crate) fn release<R: Aggregate>(&self, mediator: &Rc<Mediator<R>>) {
        let mut slots = self.slots.borrow_mut();
        let type_id = TypeId::of::<R>();
        let Some(slot) = slots
            .get_mut(&type_id)
            .and_then(|slot| slot.downcast_mut::<TypeSlots<R>>())
        else {
            return;
        };

        slot.remove(mediator);
        if slot.len() == 0 {
            slots.remove(&type_id);
        }
        debug!(entity_type = %mediator.entity_type(), id = ?mediator.mediated_id(), "released mediator");
    }

    /// Is a root of type `R` with this id being mediated on this thread?
    pub fn contains_id<R: Aggregate>(&self, id: EntityId) -> bool {
        self.slots
            .borrow()
            .get(&TypeId::of::<R>())
            .and_then(|slot| slot.downcast_ref::<TypeSlots<R>>())
            .is_some_and(|slot| slot.contains_id(id))
    }

    /// Active mediators of type `R`.
    pub fn count<R: Aggregate>(&self) -> usize {
        self.slots
            .borrow()
            .get(&TypeId::of::<R>())
            .and_then(|slot| slot.downcast_ref::<TypeSlots<R>>())
            .map_or(0, TypeSlots::len)
    }

    /// True when no mediator of any type is active.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl std::fmt::Debug for MediatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorRegistry")
            .field("types", &self.slots.borrow().len())
            .finish()
    }
}

//! Mediated root type definitions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keystone_core::{Aggregate, EntityType, MediationResult, Phase};

use crate::builder::TypeRegistryBuilder;
use crate::context::MediationContext;

/// A phase callback on root type `R`.
pub type Callback<R> =
    Arc<dyn Fn(&Rc<R>, &MediationContext) -> MediationResult<()> + Send + Sync>;

/// Everything the coordinator knows about one root type: its phase
/// callbacks, its dependents and the class-level mediation switch.
pub struct MediatedType<R> {
    pub(crate) name: EntityType,
    pub(crate) before: Vec<Callback<R>>,
    pub(crate) reconcile: Vec<Callback<R>>,
    pub(crate) cache: Vec<Callback<R>>,
    pub(crate) bumps: Option<Callback<R>>,
    pub(crate) dependents: Vec<EntityType>,
    pub(crate) enabled: AtomicBool,
    pub(crate) _root: PhantomData<fn() -> R>,
}

impl<R: Aggregate> MediatedType<R> {
    pub fn name(&self) -> &EntityType {
        &self.name
    }

    pub fn dependents(&self) -> &[EntityType] {
        &self.dependents
    }

    pub fn declares_dependent(&self, entity_type: &EntityType) -> bool {
        self.dependents.contains(entity_type)
    }

    /// Callbacks for a phase, in declaration order.
    pub fn callbacks(&self, phase: Phase) -> &[Callback<R>] {
        match phase {
            Phase::Before => &self.before,
            Phase::Reconcile => &self.reconcile,
            Phase::Cache => &self.cache,
            Phase::Bump => match &self.bumps {
                Some(bump) => std::slice::from_ref(bump),
                None => &[],
            },
        }
    }

    // ========== Class-level switch ==========

    /// Mediators created from now on start enabled.
    pub fn enable_all_mediation(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Mediators created from now on start disabled. Running ones finish
    /// as they started.
    pub fn disable_all_mediation(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn mediation_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl<R> fmt::Debug for MediatedType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatedType")
            .field("name", &self.name)
            .field("before", &self.before.len())
            .field("reconcile", &self.reconcile.len())
            .field("cache", &self.cache.len())
            .field("bumps", &self.bumps.is_some())
            .field("dependents", &self.dependents)
            .field("enabled", &self.enabled.load(Ordering::SeqCst))
            .finish()
    }
}

/// Immutable set of mediated root types, shared across threads.
#[derive(Default)]
pub struct TypeRegistry {
    roots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<EntityType, TypeId>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    pub(crate) fn new(
        roots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
        names: HashMap<EntityType, TypeId>,
    ) -> Self {
        Self { roots, names }
    }

    /// The definition registered for `R`.
    pub fn get<R: Aggregate>(&self) -> Option<Arc<MediatedType<R>>> {
        self.roots
            .get(&TypeId::of::<R>())
            .cloned()
            .and_then(|def| def.downcast::<MediatedType<R>>().ok())
    }

    pub fn contains<R: Aggregate>(&self) -> bool {
        self.roots.contains_key(&TypeId::of::<R>())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(&EntityType::new(name))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("roots", &names).finish()
    }
}

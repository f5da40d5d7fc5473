//! TypeRegistryBuilder for declaring mediated roots.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use keystone_core::{Aggregate, EntityType, MediationResult};
use regex_lite::Regex;
use thiserror::Error;

use crate::context::MediationContext;
use crate::types::{Callback, MediatedType, TypeRegistry};

/// Errors that can occur while declaring mediated types.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate type name: {0}")]
    DuplicateTypeName(String),

    #[error("Root type registered twice: {0}")]
    DuplicateRoot(String),

    #[error("Invalid type name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate dependent {dependent} on {root}")]
    DuplicateDependent { root: String, dependent: String },
}

/// snake_case, starting with a letter.
fn valid_name(name: &str) -> bool {
    static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
    NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Builder for an immutable [`TypeRegistry`].
#[derive(Default)]
pub struct TypeRegistryBuilder {
    roots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<EntityType, TypeId>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `R` as a mediated root named `name`.
    pub fn root<R: Aggregate>(&mut self, name: impl Into<String>) -> RootBuilder<'_, R> {
        RootBuilder {
            builder: self,
            name: name.into(),
            before: Vec::new(),
            reconcile: Vec::new(),
            cache: Vec::new(),
            bumps: None,
            dependents: Vec::new(),
            enabled: true,
        }
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry::new(self.roots, self.names)
    }
}

/// Builder for one root type.
pub struct RootBuilder<'a, R> {
    builder: &'a mut TypeRegistryBuilder,
    name: String,
    before: Vec<Callback<R>>,
    reconcile: Vec<Callback<R>>,
    cache: Vec<Callback<R>>,
    bumps: Option<Callback<R>>,
    dependents: Vec<String>,
    enabled: bool,
}

impl<'a, R: Aggregate> RootBuilder<'a, R> {
    /// Run before the wrapped operation.
    pub fn before<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Rc<R>, &MediationContext) -> MediationResult<()> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(callback));
        self
    }

    /// Run after a successful operation; may write more of the graph.
    pub fn reconcile<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Rc<R>, &MediationContext) -> MediationResult<()> + Send + Sync + 'static,
    {
        self.reconcile.push(Arc::new(callback));
        self
    }

    /// Recompute derived attributes after reconciliation.
    pub fn cache<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Rc<R>, &MediationContext) -> MediationResult<()> + Send + Sync + 'static,
    {
        self.cache.push(Arc::new(callback));
        self
    }

    /// The single version bump. A later call replaces an earlier one.
    pub fn bumps<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Rc<R>, &MediationContext) -> MediationResult<()> + Send + Sync + 'static,
    {
        self.bumps = Some(Arc::new(callback));
        self
    }

    /// Declare a dependent type whose writes route through this root.
    pub fn dependent(mut self, name: impl Into<String>) -> Self {
        self.dependents.push(name.into());
        self
    }

    /// Start with the class-level switch off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Finish building this type.
    pub fn done(self) -> Result<EntityType, RegistryError> {
        if !valid_name(&self.name) {
            return Err(RegistryError::InvalidName(self.name));
        }
        let name = EntityType::new(self.name.as_str());
        if self.builder.names.contains_key(&name) {
            return Err(RegistryError::DuplicateTypeName(self.name));
        }
        let type_id = TypeId::of::<R>();
        if self.builder.roots.contains_key(&type_id) {
            return Err(RegistryError::DuplicateRoot(self.name));
        }

        let mut dependents: Vec<EntityType> = Vec::with_capacity(self.dependents.len());
        for dependent in self.dependents {
            if !valid_name(&dependent) {
                return Err(RegistryError::InvalidName(dependent));
            }
            let dependent = EntityType::new(dependent);
            if dependents.contains(&dependent) {
                return Err(RegistryError::DuplicateDependent {
                    root: self.name,
                    dependent: dependent.to_string(),
                });
            }
            dependents.push(dependent);
        }

        let def: MediatedType<R> = MediatedType {
            name: name.clone(),
            before: self.before,
            reconcile: self.reconcile,
            cache: self.cache,
            bumps: self.bumps,
            dependents,
            enabled: AtomicBool::new(self.enabled),
            _root: PhantomData,
        };

        self.builder.names.insert(name.clone(), type_id);
        self.builder.roots.insert(type_id, Arc::new(def));

        Ok(name)
    }
}

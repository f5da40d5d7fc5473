//! Keystone Mediator
//!
//! Coordinates multi-entity write transactions rooted at one aggregate.
//!
//! Responsibilities:
//! - Collapse nested writes on a root and its dependents into one logical transaction
//! - Run before/reconcile/cache phases and a single version bump per transaction
//! - Keep at most one mediator per root instance per thread
//! - Suppress per-row optimistic locking on the root while mediating
//! - Feed entity changes into a transaction-wide ledger
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use std::sync::Arc;
//! # use keystone_core::{Aggregate, ChangeSet, EntityId, EntityType, MediationError, MediationSwitch, Tracked};
//! # use keystone_mediator::{MediationContext, TypeRegistry};
//! # struct Pen { switch: MediationSwitch }
//! # impl Tracked for Pen {
//! #     fn entity_type(&self) -> EntityType { "pen".into() }
//! #     fn entity_id(&self) -> Option<EntityId> { None }
//! #     fn pending_changes(&self) -> ChangeSet { ChangeSet::new() }
//! # }
//! # impl Aggregate for Pen { fn mediation_switch(&self) -> &MediationSwitch { &self.switch } }
//! let mut builder = TypeRegistry::builder();
//! builder
//!     .root::<Pen>("pen")
//!     .reconcile(|_pen, _ctx| Ok(()))
//!     .dependent("dingo")
//!     .done()?;
//! let ctx = MediationContext::new(Arc::new(builder.build()));
//!
//! let pen = Rc::new(Pen { switch: MediationSwitch::new() });
//! ctx.mediated_transaction(&pen, || Ok::<_, MediationError>(()))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod config;
mod context;
mod decorate;
mod mediator;
mod registry;
mod state;
mod types;
mod versioning;


pub use builder::{RegistryError, RootBuilder, TypeRegistryBuilder};
pub use config::MediationConfig;
pub use context::MediationContext;
pub use decorate::without_mediation;
pub use mediator::Mediator;
pub use registry::MediatorRegistry;
pub use state::{MediatorState, Transition};
pub use types::{Callback, MediatedType, TypeRegistry};
pub use versioning::VersioningGuard;

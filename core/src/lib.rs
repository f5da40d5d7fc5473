//! Keystone Core Types
//!
//! This crate provides the foundational types used throughout keystone:
//! - Identity types (EntityId, EntityType, EntityState)
//! - Value types (the Value enum and attribute maps)
//! - Change sets (per-entity attribute deltas)
//! - The traits a persistence layer implements to be mediated
//! - The shared error taxonomy

mod aggregate;
mod change;
mod error;
mod id;
mod value;

pub use aggregate::*;
pub use change::*;
pub use error::*;
pub use id::*;
pub use value::*;

//! Keystone Ledger
//!
//! The in-memory record of every entity change observed during one
//! mediated transaction.
//!
//! Responsibilities:
//! - Bucket change sets by entity type: created, destroyed, altered by id
//! - Maintain a transaction-wide and a per-type index of changed attributes
//! - Answer existential queries for reconciliation and cache callbacks

mod index;
mod ledger;

pub use index::AttributeIndex;
pub use ledger::{ChangeLedger, TypeChanges};

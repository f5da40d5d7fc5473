//! Keystone Store
//!
//! An in-memory row store that behaves like the relational layer a
//! mediated aggregate sits on.
//!
//! Responsibilities:
//! - Hold typed tables shared across threads
//! - Open per-thread connections with nestable units of work
//! - Undo every write of a rolled-back unit
//! - Enforce optimistic locking on a per-row version column
//! - Track dirty attributes on loaded records

mod connection;
mod database;
mod error;
mod record;
mod undo;

pub use connection::{Connection, UnitState};
pub use database::{Database, Row};
pub use error::{StoreError, StoreResult};
pub use record::Record;

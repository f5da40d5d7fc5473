//! Shared in-memory tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keystone_core::{Attributes, EntityId, EntityType, Value};
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::{StoreError, StoreResult};

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: EntityId,
    /// Optimistic-lock column. Starts at 0 on insert.
    pub lock_version: u64,
    pub attributes: Attributes,
}

impl Row {
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attributes.get(attr)
    }
}

/// Rows of one entity type plus its id sequence.
#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<EntityId, Row>,
    next_id: u64,
}

impl Table {
    fn alloc_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId::new(self.next_id)
    }

    fn row_mut(&mut self, entity_type: &EntityType, id: EntityId) -> StoreResult<&mut Row> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))
    }
}

/// Check the loaded version against the stored one and bump it.
fn check_and_bump(
    entity_type: &EntityType,
    row: &mut Row,
    expected: Option<u64>,
) -> StoreResult<()> {
    if let Some(expected) = expected {
        if row.lock_version != expected {
            return Err(StoreError::stale_object(
                entity_type.clone(),
                row.id,
                expected,
                row.lock_version,
            ));
        }
        row.lock_version += 1;
    }
    Ok(())
}

/// The tables every connection reads and writes.
///
/// Writes are applied immediately; a connection's unit of work keeps the
/// prior row images so it can put them back on rollback.
#[derive(Debug, Default)]
pub struct Database {
    tables: Mutex<HashMap<EntityType, Table>>,
}

impl Database {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a connection for the calling thread.
    pub fn connect(self: &Arc<Self>) -> Connection {
        Connection::new(Arc::clone(self))
    }

    // ========== Reads ==========

    pub fn find(&self, entity_type: &EntityType, id: EntityId) -> StoreResult<Row> {
        self.tables
            .lock()
            .get(entity_type)
            .and_then(|table| table.rows.get(&id))
            .cloned()
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))
    }

    pub fn exists(&self, entity_type: &EntityType, id: EntityId) -> bool {
        self.tables
            .lock()
            .get(entity_type)
            .is_some_and(|table| table.rows.contains_key(&id))
    }

    /// Every row of a type, in id order.
    pub fn all(&self, entity_type: &EntityType) -> Vec<Row> {
        self.tables
            .lock()
            .get(entity_type)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows whose `attr` equals `value`.
    pub fn find_by(&self, entity_type: &EntityType, attr: &str, value: &Value) -> Vec<Row> {
        self.tables
            .lock()
            .get(entity_type)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|row| row.get(attr) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, entity_type: &EntityType) -> usize {
        self.tables
            .lock()
            .get(entity_type)
            .map_or(0, |table| table.rows.len())
    }

    // ========== Writes ==========
    // Each write returns the prior row image for the undo log.

    pub(crate) fn insert(&self, entity_type: &EntityType, attributes: Attributes) -> Row {
        let mut tables = self.tables.lock();
        let table = tables.entry(entity_type.clone()).or_default();
        let row = Row {
            id: table.alloc_id(),
            lock_version: 0,
            attributes,
        };
        table.rows.insert(row.id, row.clone());
        row
    }

    /// Write `changed` over the row. With `expected` set, the version is
    /// checked and incremented.
    pub(crate) fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        changed: &Attributes,
        expected: Option<u64>,
    ) -> StoreResult<(Row, u64)> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))?;
        let row = table.row_mut(entity_type, id)?;
        let prior = row.clone();

        check_and_bump(entity_type, row, expected)?;
        for (attr, value) in changed {
            row.attributes.insert(attr.clone(), value.clone());
        }
        Ok((prior, row.lock_version))
    }

    pub(crate) fn delete(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        expected: Option<u64>,
    ) -> StoreResult<Row> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))?;
        let row = table.row_mut(entity_type, id)?;
        if let Some(expected) = expected {
            if row.lock_version != expected {
                return Err(StoreError::stale_object(
                    entity_type.clone(),
                    id,
                    expected,
                    row.lock_version,
                ));
            }
        }
        table
            .rows
            .remove(&id)
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))
    }

    /// Add `delta` to each counter column; with `bump_version` the version
    /// column is incremented too, without a check.
    pub(crate) fn increment(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        counters: &[(&str, i64)],
        bump_version: bool,
    ) -> StoreResult<Row> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::row_not_found(entity_type.clone(), id))?;
        let row = table.row_mut(entity_type, id)?;
        let prior = row.clone();

        for (attr, delta) in counters {
            let current = match row.get(attr) {
                None | Some(Value::Null) => 0,
                Some(Value::Int(n)) => *n,
                Some(_) => {
                    *row = prior;
                    return Err(StoreError::NotACounter {
                        entity_type: entity_type.clone(),
                        id,
                        attr: attr.to_string(),
                    });
                }
            };
            row.attributes
                .insert(attr.to_string(), Value::Int(current + delta));
        }
        if bump_version {
            row.lock_version += 1;
        }
        Ok(prior)
    }

    /// Put a prior image back; `None` removes a row inserted by the unit.
    pub(crate) fn restore(&self, entity_type: &EntityType, id: EntityId, prior: Option<Row>) {
        let mut tables = self.tables.lock();
        let table = tables.entry(entity_type.clone()).or_default();
        match prior {
            Some(row) => {
                table.rows.insert(id, row);
            }
            None => {
                table.rows.remove(&id);
            }
        }
    }
}

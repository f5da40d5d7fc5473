//! Loaded records with dirty tracking.

use keystone_core::{
    AttributeChange, Attributes, ChangeSet, EntityId, EntityType, Locking, Tracked, Value,
};

use crate::connection::Connection;
use crate::database::Row;
use crate::error::{StoreError, StoreResult};

/// An in-memory copy of one row plus the attributes written since it was
/// loaded.
#[derive(Debug, Clone)]
pub struct Record {
    entity_type: EntityType,
    id: Option<EntityId>,
    lock_version: u64,
    attributes: Attributes,
    /// Attribute values as last loaded or saved.
    original: Attributes,
    destroyed: bool,
}

impl Record {
    /// A new, unsaved record.
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self::with_attributes(entity_type, Attributes::new())
    }

    pub fn with_attributes(entity_type: impl Into<EntityType>, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            lock_version: 0,
            attributes,
            original: Attributes::new(),
            destroyed: false,
        }
    }

    pub fn from_row(entity_type: impl Into<EntityType>, row: Row) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: Some(row.id),
            lock_version: row.lock_version,
            original: row.attributes.clone(),
            attributes: row.attributes,
            destroyed: false,
        }
    }

    /// Load a record by id.
    pub fn find(conn: &Connection, entity_type: impl Into<EntityType>, id: EntityId) -> StoreResult<Self> {
        let entity_type = entity_type.into();
        let row = conn.find(&entity_type, id)?;
        Ok(Self::from_row(entity_type, row))
    }

    // ========== Accessors ==========

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn lock_version(&self) -> u64 {
        self.lock_version
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attributes.get(attr)
    }

    /// Integer attribute, with missing or null read as 0.
    pub fn get_int(&self, attr: &str) -> i64 {
        self.get(attr).and_then(Value::as_int).unwrap_or(0)
    }

    pub fn get_str(&self, attr: &str) -> Option<&str> {
        self.get(attr).and_then(Value::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(attr.into(), value.into());
    }

    // ========== Dirty Tracking ==========

    /// Attributes whose value differs from the last loaded or saved one.
    pub fn changed(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(attr, value)| self.original.get(attr.as_str()) != Some(*value))
            .map(|(attr, value)| (attr.clone(), value.clone()))
            .collect()
    }

    pub fn is_changed(&self) -> bool {
        self.attributes
            .iter()
            .any(|(attr, value)| self.original.get(attr.as_str()) != Some(value))
    }

    /// The unsaved deltas as old/new pairs. Missing originals read as null.
    pub fn pending_changes(&self) -> ChangeSet {
        self.changed()
            .into_iter()
            .map(|(attr, new)| {
                let old = self.original.get(&attr).cloned().unwrap_or(Value::Null);
                (attr, AttributeChange::new(old, new))
            })
            .collect()
    }

    // ========== Persistence ==========

    /// Insert a new record, or write its changed attributes.
    ///
    /// An existing record with no changes is not written and its version
    /// stays put.
    pub fn save(&mut self, conn: &Connection, locking: Locking) -> StoreResult<()> {
        self.ensure_live()?;
        match self.id {
            None => {
                let row = conn.insert(&self.entity_type, self.attributes.clone());
                self.id = Some(row.id);
                self.lock_version = row.lock_version;
            }
            Some(id) => {
                let changed = self.changed();
                if changed.is_empty() {
                    return Ok(());
                }
                self.lock_version =
                    conn.update(&self.entity_type, id, &changed, locking, self.lock_version)?;
            }
        }
        self.original = self.attributes.clone();
        Ok(())
    }

    pub fn destroy(&mut self, conn: &Connection, locking: Locking) -> StoreResult<()> {
        let id = self.persisted_id()?;
        self.ensure_live()?;
        conn.delete(&self.entity_type, id, locking, self.lock_version)?;
        self.destroyed = true;
        Ok(())
    }

    /// Bump the version without changing attributes.
    pub fn touch(&mut self, conn: &Connection, locking: Locking) -> StoreResult<()> {
        let id = self.persisted_id()?;
        self.ensure_live()?;
        self.lock_version = conn.update(
            &self.entity_type,
            id,
            &Attributes::new(),
            locking,
            self.lock_version,
        )?;
        Ok(())
    }

    /// Discard unsaved changes and re-read the row.
    pub fn reload(&mut self, conn: &Connection) -> StoreResult<()> {
        let id = self.persisted_id()?;
        let row = conn.find(&self.entity_type, id)?;
        self.lock_version = row.lock_version;
        self.original = row.attributes.clone();
        self.attributes = row.attributes;
        Ok(())
    }

    fn persisted_id(&self) -> StoreResult<EntityId> {
        self.id.ok_or_else(|| StoreError::NotPersisted {
            entity_type: self.entity_type.clone(),
        })
    }

    fn ensure_live(&self) -> StoreResult<()> {
        match (self.destroyed, self.id) {
            (true, Some(id)) => Err(StoreError::Destroyed {
                entity_type: self.entity_type.clone(),
                id,
            }),
            _ => Ok(()),
        }
    }
}

impl Tracked for Record {
    fn entity_type(&self) -> EntityType {
        self.entity_type.clone()
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.id
    }

    fn pending_changes(&self) -> ChangeSet {
        Record::pending_changes(self)
    }
}

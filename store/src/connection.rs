//! Per-thread connection with nestable units of work.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use keystone_core::{
    Attributes, EntityId, EntityType, Locking, MediationError, MediationResult, UnitOfWork,
};
use tracing::{debug, trace, warn};

use crate::database::{Database, Row};
use crate::error::{StoreError, StoreResult};
use crate::undo::UndoLog;

/// Unit of work state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No unit is open; writes apply immediately.
    Inactive,
    /// A unit is open.
    Active,
    /// A nested unit rolled back; the outermost one can only roll back.
    RollbackOnly,
}

/// A connection to a [`Database`].
///
/// Connections are not shared between threads. A `begin` inside an open
/// unit joins it; only the outermost `commit` or `rollback` ends it.
pub struct Connection {
    db: Arc<Database>,
    state: Cell<UnitState>,
    depth: Cell<usize>,
    undo: RefCell<UndoLog>,
}

impl Connection {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            state: Cell::new(UnitState::Inactive),
            depth: Cell::new(0),
            undo: RefCell::new(UndoLog::new()),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn state(&self) -> UnitState {
        self.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.state.get() != UnitState::Inactive
    }

    /// Number of `begin` calls not yet matched.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    // ========== Unit of Work Lifecycle ==========

    pub fn begin(&self) -> StoreResult<()> {
        let depth = self.depth.get();
        if depth == 0 {
            *self.undo.borrow_mut() = UndoLog::new();
            self.state.set(UnitState::Active);
            debug!("unit of work opened");
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    pub fn commit(&self) -> StoreResult<()> {
        match self.depth.get() {
            0 => Err(StoreError::NoActiveUnitOfWork),
            1 => {
                if self.state.get() == UnitState::RollbackOnly {
                    warn!("commit of a unit marked rollback-only");
                    self.do_rollback();
                    return Err(StoreError::RolledBack);
                }
                let writes = self.undo.replace(UndoLog::new()).len();
                self.finish();
                debug!(writes, "unit of work committed");
                Ok(())
            }
            depth => {
                self.depth.set(depth - 1);
                Ok(())
            }
        }
    }

    pub fn rollback(&self) -> StoreResult<()> {
        match self.depth.get() {
            0 => Err(StoreError::NoActiveUnitOfWork),
            1 => {
                self.do_rollback();
                Ok(())
            }
            depth => {
                self.depth.set(depth - 1);
                self.state.set(UnitState::RollbackOnly);
                Ok(())
            }
        }
    }

    fn do_rollback(&self) {
        let log = self.undo.replace(UndoLog::new());
        let writes = log.len();
        log.undo(&self.db);
        self.finish();
        debug!(writes, "unit of work rolled back");
    }

    fn finish(&self) {
        self.depth.set(0);
        self.state.set(UnitState::Inactive);
    }

    /// Run `f` inside a unit of work, committing on `Ok` and rolling back on `Err`.
    pub fn transaction<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.begin()?;
        match f() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback()?;
                Err(err)
            }
        }
    }

    // ========== Reads ==========

    pub fn find(&self, entity_type: &EntityType, id: EntityId) -> StoreResult<Row> {
        self.db.find(entity_type, id)
    }

    // ========== Writes ==========

    pub fn insert(&self, entity_type: &EntityType, attributes: Attributes) -> Row {
        let row = self.db.insert(entity_type, attributes);
        trace!(%entity_type, id = %row.id, "insert");
        self.remember(entity_type, row.id, None);
        row
    }

    /// Write changed attributes. Returns the row's version afterwards.
    pub fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        changed: &Attributes,
        locking: Locking,
        loaded_version: u64,
    ) -> StoreResult<u64> {
        let expected = locking.is_enabled().then_some(loaded_version);
        let (prior, version) = self.db.update(entity_type, id, changed, expected)?;
        trace!(%entity_type, %id, ?locking, version, "update");
        self.remember(entity_type, id, Some(prior));
        Ok(version)
    }

    pub fn delete(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        locking: Locking,
        loaded_version: u64,
    ) -> StoreResult<()> {
        let expected = locking.is_enabled().then_some(loaded_version);
        let prior = self.db.delete(entity_type, id, expected)?;
        trace!(%entity_type, %id, ?locking, "delete");
        self.remember(entity_type, id, Some(prior));
        Ok(())
    }

    /// Add deltas to counter columns. Under optimistic locking the version
    /// is incremented without a check.
    pub fn update_counters(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        counters: &[(&str, i64)],
        locking: Locking,
    ) -> StoreResult<()> {
        let prior = self
            .db
            .increment(entity_type, id, counters, locking.is_enabled())?;
        trace!(%entity_type, %id, ?locking, "update counters");
        self.remember(entity_type, id, Some(prior));
        Ok(())
    }

    fn remember(&self, entity_type: &EntityType, id: EntityId, prior: Option<Row>) {
        if self.is_active() {
            self.undo.borrow_mut().record(entity_type, id, prior);
        }
    }
}

impl UnitOfWork for Connection {
    fn begin(&self) -> MediationResult<()> {
        Connection::begin(self).map_err(MediationError::from)
    }

    fn commit(&self) -> MediationResult<()> {
        Connection::commit(self).map_err(MediationError::from)
    }

    fn rollback(&self) -> MediationResult<()> {
        Connection::rollback(self).map_err(MediationError::from)
    }
}

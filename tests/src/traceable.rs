//! A root that writes the name of every phase it runs into a trace.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use keystone_core::{
    attrs, Aggregate, ChangeSet, EntityId, EntityType, MediationError, MediationResult,
    MediationSwitch, Outcome, Tracked,
};
use keystone_mediator::{without_mediation, MediationContext, TypeRegistry};
use keystone_store::{Connection, Record};

use crate::error::FixtureResult;

pub const TRACEABLE: &str = "traceable";

pub fn traceable_types() -> FixtureResult<Arc<TypeRegistry>> {
    let mut builder = TypeRegistry::builder();
    builder
        .root::<Traceable>(TRACEABLE)
        .before(|t, _| {
            t.push("before");
            Ok(())
        })
        .reconcile(|t, _| {
            t.push("reconcile");
            Ok(())
        })
        .cache(|t, _| {
            t.push("cache");
            Ok(())
        })
        .bumps(|t, ctx| {
            t.push("bump");
            let locking = ctx.versioning().locking_for(t);
            t.record
                .borrow_mut()
                .touch(&t.conn, locking)
                .map_err(MediationError::from)
        })
        .done()?;
    Ok(Arc::new(builder.build()))
}

pub struct Traceable {
    record: RefCell<Record>,
    conn: Rc<Connection>,
    switch: MediationSwitch,
    trace: RefCell<Vec<&'static str>>,
}

impl Traceable {
    pub fn new(conn: &Rc<Connection>, name: Option<&str>) -> Rc<Self> {
        let record = match name {
            Some(name) => Record::with_attributes(TRACEABLE, attrs! { "name" => name }),
            None => Record::new(TRACEABLE),
        };
        Self::from_record(conn, record)
    }

    /// Insert a traceable without mediating, leaving its trace empty.
    pub fn seed(ctx: &MediationContext, conn: &Rc<Connection>, name: &str) -> FixtureResult<Rc<Self>> {
        let traceable = Self::new(conn, Some(name));
        without_mediation(&*traceable, || traceable.save(ctx))?;
        Ok(traceable)
    }

    pub fn find(conn: &Rc<Connection>, id: EntityId) -> FixtureResult<Rc<Self>> {
        Ok(Self::from_record(conn, Record::find(conn, TRACEABLE, id)?))
    }

    fn from_record(conn: &Rc<Connection>, record: Record) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(record),
            conn: Rc::clone(conn),
            switch: MediationSwitch::new(),
            trace: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Option<EntityId> {
        self.record.borrow().id()
    }

    pub fn version(&self) -> u64 {
        self.record.borrow().lock_version()
    }

    pub fn trace(&self) -> Vec<&'static str> {
        self.trace.borrow().clone()
    }

    pub fn clear_trace(&self) {
        self.trace.borrow_mut().clear();
    }

    fn push(&self, phase: &'static str) {
        self.trace.borrow_mut().push(phase);
    }

    /// Save, refusing a traceable without a name.
    pub fn save(self: &Rc<Self>, ctx: &MediationContext) -> FixtureResult<bool> {
        ctx.mediated_save(self, &**self, || {
            if self.record.borrow().get_str("name").map_or(true, str::is_empty) {
                return Ok(false);
            }
            let locking = ctx.versioning().locking_for(self);
            self.record.borrow_mut().save(&self.conn, locking)?;
            Ok(true)
        })
    }

    pub fn update_name(self: &Rc<Self>, ctx: &MediationContext, name: &str) -> FixtureResult<bool> {
        self.record.borrow_mut().set("name", name);
        self.save(ctx)
    }

    pub fn mediated_transaction<T: Outcome>(
        self: &Rc<Self>,
        ctx: &MediationContext,
        op: impl FnOnce() -> FixtureResult<T>,
    ) -> FixtureResult<T> {
        ctx.mediated_transaction(self, op)
    }
}

impl Tracked for Traceable {
    fn entity_type(&self) -> EntityType {
        TRACEABLE.into()
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.id()
    }

    fn pending_changes(&self) -> ChangeSet {
        self.record.borrow().pending_changes()
    }
}

impl Aggregate for Traceable {
    fn mediation_switch(&self) -> &MediationSwitch {
        &self.switch
    }

    fn lock_version(&self) -> Option<u64> {
        let record = self.record.borrow();
        record.id().map(|_| record.lock_version())
    }

    fn reload(&self) -> MediationResult<()> {
        self.record
            .borrow_mut()
            .reload(&self.conn)
            .map_err(MediationError::from)
    }

    fn is_destroyed(&self) -> bool {
        self.record.borrow().is_destroyed()
    }
}

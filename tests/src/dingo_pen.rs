//! Dingo pens.
//!
//! Reconcile tops up biscuits that fell under the pen's minimum and feeds
//! hungry dingos; cache totals the biscuits onto the pen; the bump
//! increments `dingo_pen_version` once per transaction.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use keystone_core::{
    Aggregate, Attributes, ChangeSet, Dependent, EntityId, EntityType, Locking, MediationError,
    MediationResult, MediationSwitch, Outcome, Tracked, Value,
};
use keystone_mediator::{MediationContext, TypeRegistry};
use keystone_store::{Connection, Record, Row};

use crate::error::FixtureResult;

pub const DINGO_PEN: &str = "dingo_pen";
pub const DINGO: &str = "dingo";
pub const BISCUIT: &str = "biscuit";

pub fn dingo_pen_types() -> FixtureResult<Arc<TypeRegistry>> {
    let mut builder = TypeRegistry::builder();
    builder
        .root::<DingoPen>(DINGO_PEN)
        .reconcile(|pen, ctx| pen.adjust_biscuit_supply(ctx).map_err(MediationError::from))
        .reconcile(|pen, ctx| pen.feed_dingos(ctx).map_err(MediationError::from))
        .cache(|pen, ctx| pen.calculate_biscuit_totals(ctx).map_err(MediationError::from))
        .bumps(|pen, ctx| {
            let version = pen.get_int("dingo_pen_version");
            pen.set("dingo_pen_version", version + 1);
            pen.save(ctx)?;
            Ok(())
        })
        .dependent(DINGO)
        .dependent(BISCUIT)
        .done()?;
    Ok(Arc::new(builder.build()))
}

// ==================== DingoPen ====================

pub struct DingoPen {
    record: RefCell<Record>,
    conn: Rc<Connection>,
    switch: MediationSwitch,
}

impl DingoPen {
    pub fn new(conn: &Rc<Connection>, attributes: Attributes) -> Rc<Self> {
        Self::from_record(conn, Record::with_attributes(DINGO_PEN, attributes))
    }

    pub fn find(conn: &Rc<Connection>, id: EntityId) -> FixtureResult<Rc<Self>> {
        Ok(Self::from_record(conn, Record::find(conn, DINGO_PEN, id)?))
    }

    fn from_record(conn: &Rc<Connection>, record: Record) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(record),
            conn: Rc::clone(conn),
            switch: MediationSwitch::new(),
        })
    }

    pub fn id(&self) -> Option<EntityId> {
        self.record.borrow().id()
    }

    pub fn version(&self) -> u64 {
        self.record.borrow().lock_version()
    }

    pub fn get_int(&self, attr: &str) -> i64 {
        self.record.borrow().get_int(attr)
    }

    pub fn get_float(&self, attr: &str) -> f64 {
        self.record
            .borrow()
            .get(attr)
            .and_then(Value::as_float)
            .unwrap_or(0.0)
    }

    pub fn set(&self, attr: &str, value: impl Into<Value>) {
        self.record.borrow_mut().set(attr, value);
    }

    pub fn save(self: &Rc<Self>, ctx: &MediationContext) -> FixtureResult<bool> {
        ctx.mediated_save(self, &**self, || {
            let locking = ctx.versioning().locking_for(self);
            self.record.borrow_mut().save(&self.conn, locking)?;
            Ok(true)
        })
    }

    pub fn mediated_transaction<T: Outcome>(
        self: &Rc<Self>,
        ctx: &MediationContext,
        op: impl FnOnce() -> FixtureResult<T>,
    ) -> FixtureResult<T> {
        ctx.mediated_transaction(self, op)
    }

    pub fn add_dingo(self: &Rc<Self>, ctx: &MediationContext, name: &str, breed: &str) -> FixtureResult<Rc<Dingo>> {
        let mut attributes = self.child_attributes();
        attributes.insert("name".to_string(), name.into());
        attributes.insert("breed".to_string(), breed.into());
        attributes.insert("state".to_string(), "hungry".into());
        let dingo = Rc::new(Dingo {
            member: Member::build(self, DINGO, attributes),
        });
        dingo.save(ctx)?;
        Ok(dingo)
    }

    pub fn add_biscuit(self: &Rc<Self>, ctx: &MediationContext, kind: &str, amount: i64, weight: f64) -> FixtureResult<Rc<Biscuit>> {
        let mut attributes = self.child_attributes();
        attributes.insert("kind".to_string(), kind.into());
        attributes.insert("amount".to_string(), amount.into());
        attributes.insert("weight".to_string(), weight.into());
        let biscuit = Rc::new(Biscuit {
            member: Member::build(self, BISCUIT, attributes),
        });
        biscuit.save(ctx)?;
        Ok(biscuit)
    }

    pub fn dingos(self: &Rc<Self>) -> Vec<Rc<Dingo>> {
        self.children(DINGO)
            .into_iter()
            .map(|row| Rc::new(Dingo { member: Member::attached(self, DINGO, row) }))
            .collect()
    }

    pub fn biscuits(self: &Rc<Self>) -> Vec<Rc<Biscuit>> {
        self.children(BISCUIT)
            .into_iter()
            .map(|row| Rc::new(Biscuit { member: Member::attached(self, BISCUIT, row) }))
            .collect()
    }

    fn child_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(id) = self.id() {
            attributes.insert("dingo_pen_id".to_string(), Value::Ref(id));
        }
        attributes
    }

    fn children(&self, entity_type: &str) -> Vec<Row> {
        let Some(id) = self.id() else {
            return Vec::new();
        };
        self.conn
            .database()
            .find_by(&entity_type.into(), "dingo_pen_id", &Value::Ref(id))
    }

    // ========== Callbacks ==========

    fn adjust_biscuit_supply(self: &Rc<Self>, ctx: &MediationContext) -> FixtureResult<()> {
        let minimum = self.get_int("biscuit_minimum");
        let maximum = self.get_int("biscuit_maximum");
        for biscuit in self.biscuits() {
            if biscuit.amount() < minimum {
                biscuit.member.set("amount", (minimum + maximum) / 2);
                biscuit.save(ctx)?;
            }
        }
        Ok(())
    }

    fn feed_dingos(self: &Rc<Self>, ctx: &MediationContext) -> FixtureResult<()> {
        for dingo in self.dingos() {
            if dingo.is_hungry() {
                dingo.eat(ctx)?;
            }
        }
        Ok(())
    }

    fn calculate_biscuit_totals(self: &Rc<Self>, ctx: &MediationContext) -> FixtureResult<()> {
        let (count, weight) = self
            .biscuits()
            .iter()
            .fold((0.0, 0.0), |(count, weight), biscuit| {
                let amount = biscuit.amount() as f64;
                (count + amount, weight + amount * biscuit.weight())
            });
        self.set("total_biscuits", count);
        self.set("total_biscuit_weight", weight);
        self.save(ctx)?;
        Ok(())
    }
}

impl Tracked for DingoPen {
    fn entity_type(&self) -> EntityType {
        DINGO_PEN.into()
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.id()
    }

    fn pending_changes(&self) -> ChangeSet {
        self.record.borrow().pending_changes()
    }
}

impl Aggregate for DingoPen {
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

// ==================== Dependents ====================

/// Record plumbing shared by dingos and biscuits.
struct Member {
    record: RefCell<Record>,
    conn: Rc<Connection>,
    pen: Rc<DingoPen>,
}

impl Member {
    fn build(pen: &Rc<DingoPen>, entity_type: &str, attributes: Attributes) -> Self {
        Self {
            record: RefCell::new(Record::with_attributes(entity_type, attributes)),
            conn: Rc::clone(&pen.conn),
            pen: Rc::clone(pen),
        }
    }

    fn attached(pen: &Rc<DingoPen>, entity_type: &str, row: Row) -> Self {
        Self {
            record: RefCell::new(Record::from_row(entity_type, row)),
            conn: Rc::clone(&pen.conn),
            pen: Rc::clone(pen),
        }
    }

    fn id(&self) -> Option<EntityId> {
        self.record.borrow().id()
    }

    fn get_int(&self, attr: &str) -> i64 {
        self.record.borrow().get_int(attr)
    }

    fn set(&self, attr: &str, value: impl Into<Value>) {
        self.record.borrow_mut().set(attr, value);
    }

    /// Write the record, filling in the pen reference on insert. Returns
    /// whether a row was inserted.
    fn write(&self) -> FixtureResult<bool> {
        let inserted = self.record.borrow().is_new();
        if inserted {
            if let Some(id) = self.pen.id() {
                self.set("dingo_pen_id", Value::Ref(id));
            }
        }
        self.record
            .borrow_mut()
            .save(&self.conn, Locking::Optimistic)?;
        Ok(inserted)
    }

    fn entity_type(&self) -> EntityType {
        self.record.borrow().entity_type().clone()
    }

    fn pending_changes(&self) -> ChangeSet {
        self.record.borrow().pending_changes()
    }
}

pub struct Dingo {
    member: Member,
}

impl Dingo {
    pub fn id(&self) -> Option<EntityId> {
        self.member.id()
    }

    pub fn state(&self) -> Option<String> {
        self.member
            .record
            .borrow()
            .get_str("state")
            .map(str::to_string)
    }

    pub fn is_hungry(&self) -> bool {
        self.state().as_deref() == Some("hungry")
    }

    pub fn save(&self, ctx: &MediationContext) -> FixtureResult<bool> {
        ctx.save_through(self, || {
            if self.member.write()? {
                let pen = &self.member.pen;
                if let Some(id) = pen.id() {
                    let locking = ctx.versioning().counter_locking_for::<DingoPen>(id);
                    self.member.conn.update_counters(
                        &DINGO_PEN.into(),
                        id,
                        &[("dingos_count", 1)],
                        locking,
                    )?;
                }
            }
            Ok(true)
        })
    }

    /// Mark the dingo satiated.
    pub fn eat(&self, ctx: &MediationContext) -> FixtureResult<bool> {
        self.member.set("state", "satiated");
        self.save(ctx)
    }
}

impl Tracked for Dingo {
    fn entity_type(&self) -> EntityType {
        self.member.entity_type()
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.id()
    }

    fn pending_changes(&self) -> ChangeSet {
        self.member.pending_changes()
    }
}

impl Dependent for Dingo {
    type Root = DingoPen;

    fn root(&self) -> Option<Rc<DingoPen>> {
        Some(Rc::clone(&self.member.pen))
    }
}

pub struct Biscuit {
    member: Member,
}

impl Biscuit {
    pub fn id(&self) -> Option<EntityId> {
        self.member.id()
    }

    pub fn amount(&self) -> i64 {
        self.member.get_int("amount")
    }

    pub fn weight(&self) -> f64 {
        self.member
            .record
            .borrow()
            .get("weight")
            .and_then(Value::as_float)
            .unwrap_or(0.0)
    }

    pub fn save(&self, ctx: &MediationContext) -> FixtureResult<bool> {
        ctx.save_through(self, || {
            self.member.write()?;
            Ok(true)
        })
    }
}

impl Tracked for Biscuit {
    fn entity_type(&self) -> EntityType {
        self.member.entity_type()
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.id()
    }

    fn pending_changes(&self) -> ChangeSet {
        self.member.pending_changes()
    }
}

impl Dependent for Biscuit {
    type Root = DingoPen;

    fn root(&self) -> Option<Rc<DingoPen>> {
        Some(Rc::clone(&self.member.pen))
    }
}

//! Change ledger for one mediated transaction.

use std::collections::BTreeMap;

use keystone_core::{ChangeSet, EntityId, EntityState, EntityType};
use tracing::trace;

use crate::index::AttributeIndex;

/// The changes recorded for one entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeChanges {
    /// Updated entities, by id.
    altered: BTreeMap<EntityId, ChangeSet>,
    /// Change sets of entities inserted during the transaction.
    created: Vec<ChangeSet>,
    /// Ids of entities removed during the transaction.
    destroyed: Vec<EntityId>,
    /// Attributes changed on this type only.
    index: AttributeIndex,
}

impl TypeChanges {
    /// Get the changes recorded for an updated entity.
    pub fn altered(&self, id: EntityId) -> Option<&ChangeSet> {
        self.altered.get(&id)
    }

    /// Iterate over updated entities.
    pub fn altered_entities(&self) -> impl Iterator<Item = (EntityId, &ChangeSet)> {
        self.altered.iter().map(|(id, changes)| (*id, changes))
    }

    pub fn created(&self) -> &[ChangeSet] {
        &self.created
    }

    pub fn destroyed(&self) -> &[EntityId] {
        &self.destroyed
    }

    pub fn index(&self) -> &AttributeIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.altered.is_empty() && self.created.is_empty() && self.destroyed.is_empty()
    }

    fn record(&mut self, state: EntityState, changes: ChangeSet) {
        self.index.merge(&changes);
        match state {
            EntityState::Created => self.created.push(changes),
            EntityState::Altered(id) => {
                self.altered.entry(id).or_default().merge(changes);
            }
            EntityState::Destroyed(id) => {
                if !self.destroyed.contains(&id) {
                    self.destroyed.push(id);
                }
            }
        }
    }
}

/// Accumulates per-entity attribute deltas across a whole mediated
/// transaction and answers existential queries over them.
///
/// Entries are only ever added; a fresh ledger replaces this one when the
/// next outermost transaction starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLedger {
    types: BTreeMap<EntityType, TypeChanges>,
    /// Attributes changed on any type.
    index: AttributeIndex,
}

impl ChangeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Recording ==========

    /// Record one entity's change set.
    ///
    /// Created entities go to the `created` bucket, destroyed ones to
    /// `destroyed` by id, everything else under its id. Repeated changes
    /// to the same id are merged.
    pub fn track(&mut self, entity_type: EntityType, state: EntityState, changes: ChangeSet) {
        trace!(%entity_type, %state, attributes = changes.len(), "tracking change");
        self.index.merge(&changes);
        self.types.entry(entity_type).or_default().record(state, changes);
    }

    // ========== Attribute queries ==========

    /// Did `attr` change anywhere, or on `entity_type` when given?
    pub fn attribute_changed(&self, attr: &str, entity_type: Option<&EntityType>) -> bool {
        match entity_type {
            None => self.index.contains(attr),
            Some(ty) => self
                .types
                .get(ty)
                .is_some_and(|changes| changes.index.contains(attr)),
        }
    }

    /// Did at least one of `attrs` change?
    pub fn any_changed<'a>(
        &self,
        attrs: impl IntoIterator<Item = &'a str>,
        entity_type: Option<&EntityType>,
    ) -> bool {
        attrs
            .into_iter()
            .any(|attr| self.attribute_changed(attr, entity_type))
    }

    /// Did every one of `attrs` change?
    pub fn all_changed<'a>(
        &self,
        attrs: impl IntoIterator<Item = &'a str>,
        entity_type: Option<&EntityType>,
    ) -> bool {
        attrs
            .into_iter()
            .all(|attr| self.attribute_changed(attr, entity_type))
    }

    /// Every attribute changed during the transaction.
    pub fn changed_attributes(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.iter()
    }

    // ========== Entity queries ==========

    /// Was an entity of this type inserted?
    pub fn added(&self, entity_type: &EntityType) -> bool {
        self.with_type(entity_type, |c| !c.created.is_empty())
    }

    /// Was an entity of this type removed?
    pub fn destroyed(&self, entity_type: &EntityType) -> bool {
        self.with_type(entity_type, |c| !c.destroyed.is_empty())
    }

    /// Was an existing entity of this type updated?
    pub fn altered(&self, entity_type: &EntityType) -> bool {
        self.with_type(entity_type, |c| !c.altered.is_empty())
    }

    pub fn added_or_destroyed(&self, entity_type: &EntityType) -> bool {
        self.added(entity_type) || self.destroyed(entity_type)
    }

    /// Was any entity of this type written at all?
    pub fn touched_any(&self, entity_type: &EntityType) -> bool {
        self.with_type(entity_type, |c| !c.is_empty())
    }

    // ========== Access ==========

    /// The changes recorded for one type.
    pub fn changes_for(&self, entity_type: &EntityType) -> Option<&TypeChanges> {
        self.types.get(entity_type)
    }

    /// The merged change set of one updated entity.
    pub fn entity_changes(&self, entity_type: &EntityType, id: EntityId) -> Option<&ChangeSet> {
        self.types.get(entity_type).and_then(|c| c.altered(id))
    }

    /// Types with at least one recorded change.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn with_type(&self, entity_type: &EntityType, f: impl FnOnce(&TypeChanges) -> bool) -> bool {
        self.types.get(entity_type).is_some_and(f)
    }
}

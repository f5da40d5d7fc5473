//! Prior row images kept by an open unit of work.

use std::collections::HashSet;

use keystone_core::{EntityId, EntityType};

use crate::database::{Database, Row};

/// First-touch images of every row the unit wrote.
#[derive(Debug, Default)]
pub(crate) struct UndoLog {
    images: Vec<(EntityType, EntityId, Option<Row>)>,
    seen: HashSet<(EntityType, EntityId)>,
}

impl UndoLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Keep the image only the first time a row is written.
    pub(crate) fn record(&mut self, entity_type: &EntityType, id: EntityId, prior: Option<Row>) {
        if self.seen.insert((entity_type.clone(), id)) {
            self.images.push((entity_type.clone(), id, prior));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.images.len()
    }

    /// Restore images newest first.
    pub(crate) fn undo(self, db: &Database) {
        for (entity_type, id, prior) in self.images.into_iter().rev() {
            db.restore(&entity_type, id, prior);
        }
    }
}

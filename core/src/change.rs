//! Per-entity attribute deltas.
//!
//! A `ChangeSet` is what a dirty-tracking layer reports for one entity:
//! attribute name -> (value before, value after).

use crate::Value;
use std::collections::btree_map::{self, BTreeMap};

/// One attribute's before/after pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// Value before the write.
    pub old: Value,
    /// Value after the write.
    pub new: Value,
}

impl AttributeChange {
    pub fn new(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// The attribute deltas of a single entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: BTreeMap<String, AttributeChange>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change for one attribute, replacing any earlier entry.
    pub fn insert(&mut self, attr: impl Into<String>, change: AttributeChange) {
        self.changes.insert(attr.into(), change);
    }

    /// Builder form of [`ChangeSet::insert`].
    pub fn with(mut self, attr: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        self.insert(attr, AttributeChange::new(old, new));
        self
    }

    /// Get the change recorded for an attribute.
    pub fn get(&self, attr: &str) -> Option<&AttributeChange> {
        self.changes.get(attr)
    }

    /// Check whether an attribute changed.
    pub fn contains(&self, attr: &str) -> bool {
        self.changes.contains_key(attr)
    }

    /// Names of the changed attributes, in order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AttributeChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fold a later change set for the same entity into this one.
    ///
    /// The earliest `old` value is kept and the latest `new` value wins.
    pub fn merge(&mut self, later: ChangeSet) {
        for (attr, change) in later.changes {
            match self.changes.entry(attr) {
                btree_map::Entry::Occupied(mut entry) => entry.get_mut().new = change.new,
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(change);
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a AttributeChange);
    type IntoIter = btree_map::Iter<'a, String, AttributeChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl FromIterator<(String, AttributeChange)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, AttributeChange)>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

/// Helper macro to create change sets.
///
/// ```
/// use keystone_core::changes;
/// let set = changes! { "name" => ("old", "new") };
/// assert!(set.contains("name"));
/// ```
#[macro_export]
macro_rules! changes {
    () => {
        $crate::ChangeSet::new()
    };
    ($($key:expr => ($old:expr, $new:expr)),+ $(,)?) => {
        {
            let mut set = $crate::ChangeSet::new();
            $(
                set.insert($key, $crate::AttributeChange::new($old, $new));
            )+
            set
        }
    };
}

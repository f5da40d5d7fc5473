//! Secondary index of changed attribute names.

use keystone_core::ChangeSet;
use std::collections::BTreeSet;

/// Attribute name -> "changed somewhere".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeIndex {
    names: BTreeSet<String>,
}

impl AttributeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every attribute named in the change set.
    pub fn merge(&mut self, changes: &ChangeSet) {
        for attr in changes.attributes() {
            if !self.names.contains(attr) {
                self.names.insert(attr.to_string());
            }
        }
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.names.contains(attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

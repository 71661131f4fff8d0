use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Actor, ValueSet};

/// A group predicate: decides whether `actor` is visible given the group's
/// value-set for a feature.
///
/// What an empty value-set means is up to the predicate; most treat it as
/// "everyone in the group".
pub type Predicate = Arc<dyn Fn(&Actor, &ValueSet) -> bool + Send + Sync>;

/// Read-only snapshot of the registered groups.
pub type Groups = Arc<BTreeMap<String, Predicate>>;

/// Maps group names to predicates.
///
/// Readers take a [`Groups`] snapshot and release the lock before any
/// predicate runs, so a predicate may call back into the registry.
#[derive(Default)]
pub struct Registry {
    table: RwLock<Groups>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the predicate for `group`.
    pub fn register<F>(&self, group: impl Into<String>, predicate: F)
    where
        F: Fn(&Actor, &ValueSet) -> bool + Send + Sync + 'static,
    {
        let group = group.into();
        tracing::debug!(group = %group, "registering group");
        let mut table = self.table.write();
        Arc::make_mut(&mut table).insert(group, Arc::new(predicate));
    }

    /// Snapshot of the current groups.
    #[must_use]
    pub fn registered(&self) -> Groups {
        self.table.read().clone()
    }

    #[must_use]
    pub fn is_registered(&self, group: &str) -> bool {
        self.table.read().contains_key(group)
    }

    /// Registered group names in ascending order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn clear(&self) {
        *self.table.write() = Groups::default();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("groups", &self.names())
            .finish()
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value_set::ValueSet;

/// The rules of one feature: group name to [`ValueSet`].
///
/// Serialized as a JSON object (`{"staff": [], "users": [1, 2]}`), which is
/// also the document stored in the Postgres `rules` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    groups: BTreeMap<String, ValueSet>,
}

/// Full dump of a store: feature name to its rules.
pub type Breakdown = BTreeMap<String, RuleSet>;

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group with the given values, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, group: &str, values: impl Into<ValueSet>) -> Self {
        self.enable(group, &values.into());
        self
    }

    /// Union `values` into the group, creating the group if needed.
    pub fn enable(&mut self, group: &str, values: &ValueSet) {
        match self.groups.get_mut(group) {
            Some(existing) => *existing = existing.union(values),
            None => {
                self.groups.insert(group.to_owned(), values.clone());
            }
        }
    }

    /// Remove `values` from the group, or the whole group when `values` is empty.
    ///
    /// A group that does not exist stays absent.
    pub fn disable(&mut self, group: &str, values: &ValueSet) {
        if values.is_empty() {
            self.groups.remove(group);
        } else if let Some(existing) = self.groups.get_mut(group) {
            *existing = existing.difference(values);
        }
    }

    #[must_use]
    pub fn get(&self, group: &str) -> Option<&ValueSet> {
        self.groups.get(group)
    }

    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Group names in ascending order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueSet)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromIterator<(String, ValueSet)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (String, ValueSet)>>(iter: I) -> Self {
        let mut rules = RuleSet::new();
        for (group, values) in iter {
            rules.enable(&group, &values);
        }
        rules
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (group, values)) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{group}: {values}")?;
        }
        write!(f, "}}")
    }
}

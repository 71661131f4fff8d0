use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::Store;
use crate::{Breakdown, Feature, Result, RuleSet, ValueSet};

/// In-process store: a feature map behind a single reader-writer lock.
///
/// Every read-modify-write runs entirely under the write lock, so merges on
/// the same group serialize. Reads clone what they need and release the lock
/// before predicates run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<BTreeMap<String, RuleSet>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn add(&self, feature: &Feature) -> Result<()> {
        self.table
            .write()
            .entry(feature.as_str().to_owned())
            .or_default();
        trace!(%feature, "added feature");
        Ok(())
    }

    fn remove(&self, feature: &Feature) -> Result<()> {
        let removed = self.table.write().remove(feature.as_str()).is_some();
        debug!(%feature, removed, "removed feature");
        Ok(())
    }

    fn enable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        self.table
            .write()
            .entry(feature.as_str().to_owned())
            .or_default()
            .enable(group, values);
        debug!(%feature, group, %values, "enabled group");
        Ok(())
    }

    fn disable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        if let Some(rules) = self.table.write().get_mut(feature.as_str()) {
            rules.disable(group, values);
            debug!(%feature, group, %values, "disabled group");
        }
        Ok(())
    }

    fn rename(&self, old: &Feature, new: &Feature) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut table = self.table.write();
        if let Some(rules) = table.remove(old.as_str()) {
            table.insert(new.as_str().to_owned(), rules);
            debug!(%old, %new, "renamed feature");
        }
        Ok(())
    }

    fn rules(&self, feature: &Feature) -> Result<Option<RuleSet>> {
        Ok(self.table.read().get(feature.as_str()).cloned())
    }

    fn exists(&self, feature: &Feature, group: Option<&str>) -> Result<bool> {
        let table = self.table.read();
        let rules = table.get(feature.as_str());
        Ok(match group {
            None => rules.is_some(),
            Some(group) => rules.is_some_and(|rules| rules.contains(group)),
        })
    }

    fn features(&self, group: Option<&str>) -> Result<Vec<String>> {
        let table = self.table.read();
        Ok(table
            .iter()
            .filter(|(_, rules)| group.map_or(true, |group| rules.contains(group)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn breakdown(&self) -> Result<Breakdown> {
        Ok(self.table.read().clone())
    }

    fn load(&self, rules: &Breakdown) -> Result<()> {
        let mut table = self.table.write();
        for (feature, feature_rules) in rules {
            table.insert(feature.clone(), feature_rules.clone());
        }
        debug!(features = rules.len(), "loaded rules");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.table.write().clear();
        debug!("cleared features");
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::codec::Serializer;
use crate::store::{MemoryStore, Store};
use crate::{
    Actor, Breakdown, Feature, Groups, Registry, Result, RuleSet, ValidationError, ValueSet,
};

/// What [`Flags::clear`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Feature rules only; registered groups survive.
    Features,
    /// Registered groups only; feature rules survive.
    Groups,
    /// Both.
    #[default]
    All,
}

/// Builder for [`Flags`]. Without a store it uses a [`MemoryStore`].
///
/// A serializer set here replaces whatever the store was built with. When
/// none is set the store keeps its own.
///
/// ```
/// use std::sync::Arc;
/// use flipside::{Flags, JsonSerializer, MemoryStore};
///
/// let flags = Flags::builder()
///     .store(MemoryStore::new())
///     .serializer(Arc::new(JsonSerializer))
///     .build();
/// assert!(flags.features(None).unwrap().is_empty());
/// ```
#[derive(Default)]
pub struct FlagsBuilder {
    store: Option<Box<dyn Store>>,
    serializer: Option<Arc<dyn Serializer>>,
}

impl FlagsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `store` as the backend.
    #[must_use]
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Use an already boxed backend.
    #[must_use]
    pub fn boxed_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serializer handed to the store through [`Store::attach_serializer`].
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    #[must_use]
    pub fn build(self) -> Flags {
        let mut store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryStore::new()));
        if let Some(serializer) = &self.serializer {
            store.attach_serializer(Arc::clone(serializer));
        }
        Flags {
            store,
            registry: Registry::new(),
            serializer: self.serializer,
        }
    }
}

/// Feature toggles: a group registry plus a rule store.
///
/// Build one at start-up and share it by reference (or behind an `Arc`).
/// Every feature name passed in is normalized (trimmed, lowercased) before
/// it reaches the store.
///
/// ```
/// use flipside::{Actor, Flags, ValueSet};
///
/// let flags = Flags::new();
/// flags.register("staff", |actor, _| actor.is("staff"));
/// flags.enable("Search", "staff", ValueSet::new()).unwrap();
///
/// assert!(flags.enabled("search", &Actor::new().set("staff", true)).unwrap());
/// assert!(!flags.enabled("search", &Actor::new()).unwrap());
/// ```
pub struct Flags {
    store: Box<dyn Store>,
    registry: Registry,
    serializer: Option<Arc<dyn Serializer>>,
}

impl Default for Flags {
    fn default() -> Self {
        FlagsBuilder::new().build()
    }
}

impl Flags {
    /// Flags backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> FlagsBuilder {
        FlagsBuilder::new()
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The serializer the builder attached, if one was given.
    #[must_use]
    pub fn serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializer.as_ref()
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    /// Register or replace the predicate for `group`.
    pub fn register<F>(&self, group: impl Into<String>, predicate: F)
    where
        F: Fn(&Actor, &ValueSet) -> bool + Send + Sync + 'static,
    {
        self.registry.register(group, predicate);
    }

    /// Snapshot of the registered groups.
    #[must_use]
    pub fn registered(&self) -> Groups {
        self.registry.registered()
    }

    #[must_use]
    pub fn is_registered(&self, group: &str) -> bool {
        self.registry.is_registered(group)
    }

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------

    /// Ensure `feature` exists.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn add(&self, feature: &str) -> Result<()> {
        self.store.add(&Feature::parse(feature)?)
    }

    /// Delete `feature` and its rules.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn remove(&self, feature: &str) -> Result<()> {
        self.store.remove(&Feature::parse(feature)?)
    }

    /// Enable `feature` for `group`, merging `values` into the group's set.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownGroup`] if `group` is not registered;
    /// nothing is written in that case.
    pub fn enable(&self, feature: &str, group: &str, values: impl Into<ValueSet>) -> Result<()> {
        let feature = Feature::parse(feature)?;
        if !self.registry.is_registered(group) {
            return Err(ValidationError::UnknownGroup {
                group: group.to_owned(),
            }
            .into());
        }
        self.store.enable(&feature, group, &values.into())
    }

    /// Remove `values` from the group's set, or the whole group when `values`
    /// is empty.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn disable(&self, feature: &str, group: &str, values: impl Into<ValueSet>) -> Result<()> {
        self.store
            .disable(&Feature::parse(feature)?, group, &values.into())
    }

    /// Move the rules of `old` to `new`, replacing any rules `new` had.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = Feature::parse(old)?;
        let new = Feature::parse(new)?;
        if old == new {
            return Ok(());
        }
        debug!(%old, %new, "renaming feature");
        self.store.rename(&old, &new)
    }

    /// Whether `feature` is visible to `actor`.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn enabled(&self, feature: &str, actor: &Actor) -> Result<bool> {
        self.store
            .enabled(&Feature::parse(feature)?, actor, &self.registry.registered())
    }

    /// Whether `feature` exists, or has rules for `group` when given.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn exists(&self, feature: &str, group: Option<&str>) -> Result<bool> {
        self.store.exists(&Feature::parse(feature)?, group)
    }

    /// Sorted feature names, optionally only those with rules for `group`.
    ///
    /// # Errors
    ///
    /// Fails on a backend error.
    pub fn features(&self, group: Option<&str>) -> Result<Vec<String>> {
        self.store.features(group)
    }

    /// The rules of one feature.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn rules(&self, feature: &str) -> Result<Option<RuleSet>> {
        self.store.rules(&Feature::parse(feature)?)
    }

    /// Every feature with its rules.
    ///
    /// # Errors
    ///
    /// Fails on a backend error.
    pub fn breakdown(&self) -> Result<Breakdown> {
        self.store.breakdown()
    }

    /// Visibility of every feature for `actor`.
    ///
    /// # Errors
    ///
    /// Fails on a backend error.
    pub fn breakdown_for(&self, actor: &Actor) -> Result<BTreeMap<String, bool>> {
        self.store.breakdown_for(actor, &self.registry.registered())
    }

    /// Replace the rules of every feature in `rules`. Names are normalized;
    /// features not listed are left alone.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a backend error.
    pub fn load(&self, rules: &Breakdown) -> Result<()> {
        let mut normalized = Breakdown::new();
        for (feature, feature_rules) in rules {
            normalized.insert(
                Feature::parse(feature)?.into_string(),
                feature_rules.clone(),
            );
        }
        self.store.load(&normalized)
    }

    /// Remove features, groups, or both.
    ///
    /// # Errors
    ///
    /// Fails on a backend error while clearing features.
    pub fn clear(&self, scope: Scope) -> Result<()> {
        if matches!(scope, Scope::Features | Scope::All) {
            self.store.clear()?;
        }
        if matches!(scope, Scope::Groups | Scope::All) {
            self.registry.clear();
        }
        debug!(?scope, "cleared");
        Ok(())
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flags")
            .field("registry", &self.registry)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

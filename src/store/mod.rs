//! Storage backends.
//!
//! Every backend implements [`Store`] with the same semantics; they differ in
//! durability and in how they keep concurrent merges atomic:
//!
//! * [`MemoryStore`]: one lock around an in-process map.
//! * `PostgresStore` (feature `postgres`): set arithmetic inside a single
//!   upsert on a `jsonb` column.
//! * `RedisStore` (feature `redis`): `WATCH`/`MULTI` optimistic transactions
//!   with bounded retry.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "redis")]
mod redis;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use self::postgres::{PostgresStore, DEFAULT_TABLE};
#[cfg(feature = "redis")]
pub use self::redis::{RedisStore, RetryPolicy, DEFAULT_KEY};

use crate::codec::Serializer;
use crate::evaluate::enabled_for_actor;
use crate::{Actor, Breakdown, Feature, Groups, Result, RuleSet, ValueSet};

/// The rule-store contract shared by all backends.
///
/// Feature arguments are already normalized. Writes to the same
/// (feature, group) pair are linearizable: concurrent `enable`/`disable`
/// calls never lose each other's values.
pub trait Store: Send + Sync {
    /// Ensure `feature` exists. Idempotent.
    fn add(&self, feature: &Feature) -> Result<()>;

    /// Delete `feature` and its rules. A missing feature is not an error.
    fn remove(&self, feature: &Feature) -> Result<()>;

    /// Union `values` into the group's value-set, creating the feature and
    /// group as needed.
    fn enable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()>;

    /// Remove `values` from the group's value-set, keeping the group. With no
    /// values, remove the group itself.
    fn disable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()>;

    /// Move all rules from `old` to `new`, discarding whatever `new` had.
    /// Does nothing if `old` does not exist or equals `new`.
    fn rename(&self, old: &Feature, new: &Feature) -> Result<()>;

    /// The rules stored for `feature`, or `None` if it does not exist.
    fn rules(&self, feature: &Feature) -> Result<Option<RuleSet>>;

    /// Existence of the feature, or of one of its groups when `group` is given.
    fn exists(&self, feature: &Feature, group: Option<&str>) -> Result<bool>;

    /// Sorted feature names, optionally only those with rules for `group`.
    fn features(&self, group: Option<&str>) -> Result<Vec<String>>;

    /// Every feature with its rules.
    fn breakdown(&self) -> Result<Breakdown>;

    /// Replace the rules of every feature in `rules`; other features are untouched.
    fn load(&self, rules: &Breakdown) -> Result<()>;

    /// Delete all features.
    fn clear(&self) -> Result<()>;

    /// Whether `feature` is visible to `actor` under the given groups.
    fn enabled(&self, feature: &Feature, actor: &Actor, groups: &Groups) -> Result<bool> {
        Ok(self
            .rules(feature)?
            .is_some_and(|rules| enabled_for_actor(&rules, actor, groups)))
    }

    /// Visibility of every feature for `actor`.
    fn breakdown_for(&self, actor: &Actor, groups: &Groups) -> Result<BTreeMap<String, bool>> {
        Ok(self
            .breakdown()?
            .into_iter()
            .map(|(feature, rules)| {
                let visible = enabled_for_actor(&rules, actor, groups);
                (feature, visible)
            })
            .collect())
    }

    /// Hand the store the serializer configured on the facade. Stores that
    /// keep value-sets natively ignore it.
    fn attach_serializer(&mut self, _serializer: Arc<dyn Serializer>) {}
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ::redis::{Client, Commands, Connection};
use tracing::{debug, info, trace, warn};

use super::Store;
use crate::codec::{JsonSerializer, Serializer};
use crate::{Breakdown, Error, Feature, Result, RuleSet, ValueSet};

/// Membership set key used when none is configured.
pub const DEFAULT_KEY: &str = "features";

/// How often an optimistic transaction is retried after `EXEC` aborts.
///
/// The delay doubles after every conflict, starting from `backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    /// Attempts actually made; a policy of zero still tries once.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1_u32 << attempt.min(16))
    }
}

/// Redis store: a membership set of feature names plus one hash per feature.
///
/// ```text
/// features            SET   {"delete", "search"}
/// features-search     HASH  staff => "[]", users => "[1,2]"
/// ```
///
/// Hash values are value-sets encoded by the attached [`Serializer`]. Merges
/// use `WATCH` + `MULTI/EXEC` and are retried under the [`RetryPolicy`]
/// when another writer touches the same hash first.
pub struct RedisStore {
    client: Client,
    key: String,
    serializer: Arc<dyn Serializer>,
    retry: RetryPolicy,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key", &self.key)
            .field("serializer", &self.serializer)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Outcome of one optimistic attempt.
enum Attempt {
    Committed,
    Skipped,
    Conflicted,
}

impl RedisStore {
    #[must_use]
    pub fn new(client: Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            serializer: Arc::new(JsonSerializer),
            retry: RetryPolicy::default(),
        }
    }

    /// Open a client for `url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns the driver error if the URL is invalid. No connection is made yet.
    pub fn open(url: &str, key: impl Into<String>) -> Result<Self> {
        let store = Self::new(Client::open(url)?, key);
        info!(key = %store.key, "opened redis client");
        Ok(store)
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    fn connection(&self) -> Result<Connection> {
        Ok(self.client.get_connection()?)
    }

    fn namespace(&self, feature: &str) -> String {
        format!("{}-{}", self.key, feature)
    }

    fn feature_rules(&self, con: &mut Connection, feature: &str) -> Result<RuleSet> {
        let fields: BTreeMap<String, String> = con.hgetall(self.namespace(feature))?;
        fields
            .into_iter()
            .map(|(group, raw)| -> Result<(String, ValueSet)> {
                Ok((group, self.serializer.decode(&raw)?))
            })
            .collect()
    }

    /// Run `attempt` until it commits or is skipped, retrying conflicts.
    ///
    /// `operation` and `target` only label the log line and the final
    /// [`Error::Conflict`].
    fn optimistic<F>(&self, operation: &'static str, target: &str, mut attempt: F) -> Result<()>
    where
        F: FnMut(&mut Connection) -> Result<Attempt>,
    {
        let mut con = self.connection()?;
        let attempts = self.retry.attempts();
        for n in 0..attempts {
            match attempt(&mut con)? {
                Attempt::Committed | Attempt::Skipped => return Ok(()),
                Attempt::Conflicted if n + 1 < attempts => {
                    let delay = self.retry.delay(n);
                    warn!(operation, target, attempt = n + 1, ?delay, "optimistic transaction conflicted");
                    thread::sleep(delay);
                }
                Attempt::Conflicted => {}
            }
        }
        Err(Error::Conflict {
            operation,
            target: target.to_owned(),
            attempts,
        })
    }
}

fn watch(con: &mut Connection, keys: &[&str]) -> Result<()> {
    ::redis::cmd("WATCH").arg(keys).query::<()>(con)?;
    Ok(())
}

fn unwatch(con: &mut Connection) -> Result<()> {
    ::redis::cmd("UNWATCH").query::<()>(con)?;
    Ok(())
}

/// Execute an atomic pipeline; `EXEC` replies nil when a watched key changed.
fn exec(pipe: &::redis::Pipeline, con: &mut Connection) -> Result<Attempt> {
    let reply: Option<::redis::Value> = pipe.query(con)?;
    Ok(match reply {
        Some(_) => Attempt::Committed,
        None => Attempt::Conflicted,
    })
}

impl Store for RedisStore {
    fn add(&self, feature: &Feature) -> Result<()> {
        let mut con = self.connection()?;
        con.sadd::<_, _, ()>(&self.key, feature.as_str())?;
        trace!(%feature, "added feature");
        Ok(())
    }

    fn remove(&self, feature: &Feature) -> Result<()> {
        let mut con = self.connection()?;
        ::redis::pipe()
            .atomic()
            .srem(&self.key, feature.as_str())
            .ignore()
            .del(self.namespace(feature.as_str()))
            .ignore()
            .query::<()>(&mut con)?;
        debug!(%feature, "removed feature");
        Ok(())
    }

    fn enable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        let hash = self.namespace(feature.as_str());
        let target = format!("{feature}:{group}");
        self.optimistic("enable", &target, |con| {
            watch(con, &[hash.as_str()])?;
            let current: Option<String> = con.hget(&hash, group)?;
            let merged = match current {
                Some(raw) => self.serializer.decode(&raw)?.union(values),
                None => values.clone(),
            };
            let encoded = self.serializer.encode(&merged)?;
            let mut pipe = ::redis::pipe();
            pipe.atomic()
                .sadd(&self.key, feature.as_str())
                .ignore()
                .hset(&hash, group, encoded)
                .ignore();
            exec(&pipe, con)
        })?;
        debug!(%feature, group, %values, "enabled group");
        Ok(())
    }

    fn disable(&self, feature: &Feature, group: &str, values: &ValueSet) -> Result<()> {
        let hash = self.namespace(feature.as_str());
        if values.is_empty() {
            let mut con = self.connection()?;
            con.hdel::<_, _, ()>(&hash, group)?;
            debug!(%feature, group, "disabled group");
            return Ok(());
        }
        let target = format!("{feature}:{group}");
        self.optimistic("disable", &target, |con| {
            watch(con, &[hash.as_str()])?;
            let Some(raw) = con.hget::<_, _, Option<String>>(&hash, group)? else {
                unwatch(con)?;
                return Ok(Attempt::Skipped);
            };
            let remaining = self.serializer.decode(&raw)?.difference(values);
            let encoded = self.serializer.encode(&remaining)?;
            let mut pipe = ::redis::pipe();
            pipe.atomic().hset(&hash, group, encoded).ignore();
            exec(&pipe, con)
        })?;
        debug!(%feature, group, %values, "disabled values");
        Ok(())
    }

    fn rename(&self, old: &Feature, new: &Feature) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let old_hash = self.namespace(old.as_str());
        let new_hash = self.namespace(new.as_str());
        let target = format!("{old} -> {new}");
        self.optimistic("rename", &target, |con| {
            watch(con, &[self.key.as_str(), old_hash.as_str(), new_hash.as_str()])?;
            let known: bool = con.sismember(&self.key, old.as_str())?;
            if !known {
                unwatch(con)?;
                return Ok(Attempt::Skipped);
            }
            let has_rules: bool = con.exists(&old_hash)?;
            let mut pipe = ::redis::pipe();
            pipe.atomic().del(&new_hash).ignore();
            if has_rules {
                pipe.rename(&old_hash, &new_hash).ignore();
            }
            pipe.srem(&self.key, old.as_str())
                .ignore()
                .sadd(&self.key, new.as_str())
                .ignore();
            exec(&pipe, con)
        })?;
        debug!(%old, %new, "renamed feature");
        Ok(())
    }

    fn rules(&self, feature: &Feature) -> Result<Option<RuleSet>> {
        let mut con = self.connection()?;
        let known: bool = con.sismember(&self.key, feature.as_str())?;
        if !known {
            return Ok(None);
        }
        self.feature_rules(&mut con, feature.as_str()).map(Some)
    }

    fn exists(&self, feature: &Feature, group: Option<&str>) -> Result<bool> {
        let mut con = self.connection()?;
        Ok(match group {
            None => con.sismember(&self.key, feature.as_str())?,
            Some(group) => con.hexists(self.namespace(feature.as_str()), group)?,
        })
    }

    fn features(&self, group: Option<&str>) -> Result<Vec<String>> {
        let mut con = self.connection()?;
        let mut names: Vec<String> = con.smembers(&self.key)?;
        names.sort();
        let Some(group) = group else {
            return Ok(names);
        };
        let mut filtered = Vec::with_capacity(names.len());
        for name in names {
            if con.hexists(self.namespace(&name), group)? {
                filtered.push(name);
            }
        }
        Ok(filtered)
    }

    fn breakdown(&self) -> Result<Breakdown> {
        let mut con = self.connection()?;
        let names: Vec<String> = con.smembers(&self.key)?;
        let mut breakdown = Breakdown::new();
        for name in names {
            let rules = self.feature_rules(&mut con, &name)?;
            breakdown.insert(name, rules);
        }
        Ok(breakdown)
    }

    fn load(&self, rules: &Breakdown) -> Result<()> {
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for (feature, feature_rules) in rules {
            let feature = Feature::parse(feature)?;
            let hash = self.namespace(feature.as_str());
            pipe.del(&hash).ignore();
            for (group, values) in feature_rules.iter() {
                pipe.hset(&hash, group, self.serializer.encode(values)?).ignore();
            }
            pipe.sadd(&self.key, feature.as_str()).ignore();
        }
        let mut con = self.connection()?;
        pipe.query::<()>(&mut con)?;
        debug!(features = rules.len(), "loaded rules");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cleared = 0;
        self.optimistic("clear", &self.key, |con| {
            watch(con, &[self.key.as_str()])?;
            let names: Vec<String> = con.smembers(&self.key)?;
            let mut pipe = ::redis::pipe();
            pipe.atomic();
            for name in &names {
                pipe.del(self.namespace(name)).ignore();
            }
            pipe.del(&self.key).ignore();
            cleared = names.len();
            exec(&pipe, con)
        })?;
        debug!(features = cleared, "cleared features");
        Ok(())
    }

    fn attach_serializer(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializer = serializer;
    }
}

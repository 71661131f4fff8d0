//! Deserializable start-up configuration.
//!
//! ```
//! use flipside::{BackendConfig, Config};
//!
//! let config: Config = serde_json::from_str(r#"{ "backend": { "kind": "memory" } }"#).unwrap();
//! assert!(matches!(config.backend, BackendConfig::Memory));
//! let flags = config.build().unwrap();
//! assert!(flags.features(None).unwrap().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::MemoryStore;
use crate::{Flags, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
}

/// Which store backs the flags, tagged by `kind`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    #[cfg(feature = "postgres")]
    Postgres(PostgresConfig),
    #[cfg(feature = "redis")]
    Redis(RedisConfig),
}

impl BackendConfig {
    /// The `kind` tag, for logs that must not carry connection URLs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "redis",
        }
    }
}

#[cfg(feature = "postgres")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Create the table on start-up if missing.
    #[serde(default = "default_true")]
    pub setup: bool,
}

#[cfg(feature = "redis")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[cfg(feature = "postgres")]
fn default_table() -> String {
    crate::store::DEFAULT_TABLE.to_owned()
}

#[cfg(feature = "postgres")]
fn default_true() -> bool {
    true
}

#[cfg(feature = "redis")]
fn default_key() -> String {
    crate::store::DEFAULT_KEY.to_owned()
}

#[cfg(feature = "redis")]
fn default_max_attempts() -> u32 {
    crate::store::RetryPolicy::default().max_attempts
}

#[cfg(feature = "redis")]
fn default_backoff_ms() -> u64 {
    5
}

impl Config {
    /// Connect the configured backend and wrap it in [`Flags`].
    ///
    /// # Errors
    ///
    /// Returns the backend error if connecting or table setup fails.
    pub fn build(&self) -> Result<Flags> {
        let builder = Flags::builder();
        let builder = match &self.backend {
            BackendConfig::Memory => builder.store(MemoryStore::new()),
            #[cfg(feature = "postgres")]
            BackendConfig::Postgres(pg) => {
                let store = crate::store::PostgresStore::connect(&pg.url, pg.table.as_str())?;
                if pg.setup {
                    store.setup()?;
                }
                builder.store(store)
            }
            #[cfg(feature = "redis")]
            BackendConfig::Redis(rd) => {
                let retry = crate::store::RetryPolicy {
                    max_attempts: rd.max_attempts,
                    backoff: std::time::Duration::from_millis(rd.backoff_ms),
                };
                builder.store(crate::store::RedisStore::open(&rd.url, rd.key.as_str())?.with_retry(retry))
            }
        };
        info!(backend = self.backend.kind(), "building flags");
        Ok(builder.build())
    }
}

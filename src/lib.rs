pub mod codec;
mod config;
mod error;
mod evaluate;
mod flags;
mod registry;
pub mod store;
mod types;

pub use codec::{CodecError, JsonSerializer, Serializer};
#[cfg(feature = "postgres")]
pub use config::PostgresConfig;
#[cfg(feature = "redis")]
pub use config::RedisConfig;
pub use config::{BackendConfig, Config};
pub use error::{Error, Result};
pub use evaluate::enabled_for_actor;
pub use flags::{Flags, FlagsBuilder, Scope};
pub use registry::{Groups, Predicate, Registry};
pub use store::{MemoryStore, Store};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
#[cfg(feature = "redis")]
pub use store::{RedisStore, RetryPolicy};
pub use types::{Actor, Breakdown, Feature, RuleSet, ValidationError, Value, ValueSet};

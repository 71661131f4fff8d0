use thiserror::Error;

use crate::codec::CodecError;
use crate::ValidationError;

/// Unified error type for every store and facade operation.
///
/// Backend transport errors are passed through unwrapped; nothing in this
/// crate retries them.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Concurrent writers kept invalidating an optimistic transaction.
    ///
    /// `target` is `feature:group` for merges, `old -> new` for renames and
    /// the membership key for a clear.
    #[error("{operation} of '{target}' conflicted with concurrent writers {attempts} times")]
    Conflict {
        operation: &'static str,
        target: String,
        attempts: u32,
    },

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] postgres::Error),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

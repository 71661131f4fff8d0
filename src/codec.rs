//! Encoding of value-sets for stores that persist them as strings.
//!
//! The Redis store keeps one hash field per group whose value is an encoded
//! [`ValueSet`]. The encoding is pluggable through [`Serializer`]; the default
//! is [`JsonSerializer`], which writes a plain JSON array:
//!
//! ```text
//! [1,2,3]
//! ["ops","support"]
//! ```
//!
//! Decoding always yields a normalized (sorted, deduplicated) set, whatever
//! order the stored text uses.

use std::fmt;

use thiserror::Error;

use crate::ValueSet;

/// Errors raised while encoding or decoding a [`ValueSet`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode value set: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value set {raw:?}: {source}")]
    Decode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Converts value-sets to and from a store's string representation.
pub trait Serializer: fmt::Debug + Send + Sync {
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the set cannot be represented.
    fn encode(&self, values: &ValueSet) -> Result<String, CodecError>;

    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if `raw` is not a valid encoding.
    fn decode(&self, raw: &str) -> Result<ValueSet, CodecError>;
}

/// JSON array encoding. The default serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, values: &ValueSet) -> Result<String, CodecError> {
        serde_json::to_string(values).map_err(CodecError::Encode)
    }

    fn decode(&self, raw: &str) -> Result<ValueSet, CodecError> {
        serde_json::from_str(raw).map_err(|source| CodecError::Decode {
            raw: raw.to_owned(),
            source,
        })
    }
}

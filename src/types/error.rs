use thiserror::Error;

/// Input rejected before it reaches a store.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("feature name is empty after normalization")]
    EmptyFeature,

    #[error("unknown group '{group}'; register it before enabling features for it")]
    UnknownGroup { group: String },

    #[error("invalid table name '{table}'")]
    InvalidTable { table: String },
}

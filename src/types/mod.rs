mod actor;
mod error;
mod feature;
mod rule_set;
mod value;
mod value_set;

pub use actor::Actor;
pub use error::ValidationError;
pub use feature::Feature;
pub use rule_set::{Breakdown, RuleSet};
pub use value::Value;
pub use value_set::ValueSet;

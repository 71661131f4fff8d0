use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Value, ValueSet};

/// The subject a feature is evaluated for: a user, a request, a tenant.
///
/// A flat map of attribute names to [`Value`]s. Names are opaque strings, so
/// `"account.plan"` is one key, not a path. Stores never look inside an
/// actor; only the registered predicates do.
///
/// Serializes as a plain JSON object, so actors can arrive with a request:
///
/// ```
/// use flipside::Actor;
///
/// let actor: Actor = serde_json::from_str(r#"{"id": 7, "staff": true}"#).unwrap();
/// assert_eq!(actor.get_int("id"), Some(7));
/// assert!(actor.is("staff"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor {
    attributes: BTreeMap<String, Value>,
}

impl Actor {
    /// An anonymous actor with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Actor::insert`].
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set an attribute, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The attribute as a string; `None` when missing or of another type.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The attribute as an integer; `None` when missing or of another type.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// `true` only when the attribute is `Value::Bool(true)`.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether the attribute is present and one of `values`.
    ///
    /// The usual body of a predicate that grants by listed ids:
    ///
    /// ```
    /// use flipside::{Actor, ValueSet};
    ///
    /// let ids = ValueSet::from([1, 2]);
    /// assert!(Actor::new().set("id", 2).in_set("id", &ids));
    /// assert!(!Actor::new().set("id", "2").in_set("id", &ids));
    /// assert!(!Actor::new().in_set("id", &ids));
    /// ```
    #[must_use]
    pub fn in_set(&self, name: &str, values: &ValueSet) -> bool {
        self.get(name).is_some_and(|value| values.contains(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Actor {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

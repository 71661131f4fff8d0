use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// A sorted, deduplicated set of [`Value`]s attached to one group of a feature.
///
/// Every way of building a `ValueSet` normalizes its input, including
/// deserialization, so a set read back from any store is sorted ascending.
/// Predicates should treat it as unordered.
///
/// ```
/// use flipside::ValueSet;
///
/// let set = ValueSet::from([3, 1, 3, 2]);
/// assert_eq!(set.to_string(), "[1, 2, 3]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<Value>")]
pub struct ValueSet {
    values: Vec<Value>,
}

impl ValueSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn normalized(mut values: Vec<Value>) -> Self {
        values.sort();
        values.dedup();
        Self { values }
    }

    /// Values present in either set.
    #[must_use]
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut merged = Vec::with_capacity(self.values.len() + other.values.len());
        merged.extend_from_slice(&self.values);
        merged.extend_from_slice(&other.values);
        Self::normalized(merged)
    }

    /// Values of `self` not present in `other`.
    #[must_use]
    pub fn difference(&self, other: &ValueSet) -> ValueSet {
        let values = self
            .values
            .iter()
            .filter(|v| !other.contains(v))
            .cloned()
            .collect();
        Self { values }
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.values.binary_search(value).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for ValueSet {
    fn from(values: Vec<Value>) -> Self {
        Self::normalized(values)
    }
}

impl From<ValueSet> for Vec<Value> {
    fn from(set: ValueSet) -> Self {
        set.values
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for ValueSet {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Into<Value>> FromIterator<T> for ValueSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::normalized(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

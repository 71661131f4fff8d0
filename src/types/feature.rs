use std::fmt;

use super::error::ValidationError;

/// A normalized feature name: surrounding whitespace trimmed, lowercased,
/// never empty.
///
/// Stores only accept `&Feature`, so un-normalized input cannot reach them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Feature(String);

impl Feature {
    /// Normalize a raw feature name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyFeature`] if nothing is left after trimming.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(ValidationError::EmptyFeature);
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Feature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        for raw in ["search", "Search", " search ", "\nSEARCH\t"] {
            assert_eq!(Feature::parse(raw).unwrap().as_str(), "search");
        }
    }

    #[test]
    fn keeps_inner_whitespace() {
        assert_eq!(Feature::parse(" Super Search ").unwrap().as_str(), "super search");
    }

    #[test]
    fn rejects_blank() {
        assert!(matches!(Feature::parse(""), Err(ValidationError::EmptyFeature)));
        assert!(matches!(Feature::parse(" \t\n"), Err(ValidationError::EmptyFeature)));
    }
}

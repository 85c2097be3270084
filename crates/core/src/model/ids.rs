use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Share identifier of an exam; doubles as the exam id of a session.
///
/// Share ids travel in URL paths, so only URL-safe characters are accepted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareId(String);

impl ShareId {
    /// Creates a new `ShareId`.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the value is empty or contains characters
    /// outside `[A-Za-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
        let id = id.into();
        let trimmed = id.trim();
        let valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ParseIdError { raw: id });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareId({})", self.0)
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error type for parsing a share id from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    raw: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid share id: {:?}", self.raw)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for ShareId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ShareId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ShareId> for String {
    fn from(value: ShareId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_url_safe_ids() {
        let id: ShareId = " abc-123_X ".parse().unwrap();
        assert_eq!(id.as_str(), "abc-123_X");
    }

    #[test]
    fn rejects_path_characters() {
        assert!(ShareId::new("a/b").is_err());
        assert!(ShareId::new("").is_err());
    }

    #[test]
    fn deserialization_validates() {
        let err = serde_json::from_str::<ShareId>("\"../x\"");
        assert!(err.is_err());
    }
}

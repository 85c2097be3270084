use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use validator::ValidateEmail;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmailError {
    #[error("email address is required")]
    Empty,

    #[error("email address is not valid: {0}")]
    Invalid(String),
}

/// Respondent email, trimmed and lower-cased.
///
/// The scoring service keys duplicate detection on this value, so two
/// spellings of the same address must normalise identically.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RespondentEmail(String);

impl RespondentEmail {
    /// Parse and normalise a respondent email.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if the value is blank or not a valid address.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EmailError::Empty);
        }
        if !normalized.validate_email() {
            return Err(EmailError::Invalid(raw.trim().to_owned()));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RespondentEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RespondentEmail({})", self.0)
    }
}

impl fmt::Display for RespondentEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RespondentEmail {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RespondentEmail> for String {
    fn from(value: RespondentEmail) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_case_and_whitespace() {
        let email = RespondentEmail::parse("  Ana.Silva@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "ana.silva@example.com");
    }

    #[test]
    fn rejects_blank_and_malformed() {
        assert_eq!(RespondentEmail::parse("   "), Err(EmailError::Empty));
        assert!(matches!(
            RespondentEmail::parse("not-an-email"),
            Err(EmailError::Invalid(_))
        ));
    }
}

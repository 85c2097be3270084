//! Share-link security configuration.
//!
//! A share link may carry an opaque `config` query parameter holding a
//! base64-encoded JSON [`SecurityConfig`]. A missing or undecodable parameter
//! is [`SecurityPolicy::NotProvided`], which is kept apart from an explicit
//! config even where both currently behave the same.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::{ParseIdError, ShareId};

/// Query parameter names accepted for the encoded config.
const CONFIG_PARAMS: [&str; 2] = ["config", "c"];

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Integrity and disclosure options attached to a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub allow_consultation: bool,
    #[serde(default = "default_true")]
    pub show_score_at_end: bool,
    #[serde(default)]
    pub show_correct_answers_at_end: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_consultation: true,
            show_score_at_end: true,
            show_correct_answers_at_end: false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigDecodeError {
    #[error("config token is not valid base64")]
    Encoding,

    #[error("config token is not a valid security config: {0}")]
    Payload(String),
}

impl SecurityConfig {
    /// Decode an opaque share-link token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigDecodeError` if the token is not base64 or does not hold
    /// a JSON security config.
    pub fn decode(token: &str) -> Result<Self, ConfigDecodeError> {
        let token = token.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .or_else(|_| STANDARD.decode(token))
            .map_err(|_| ConfigDecodeError::Encoding)?;
        serde_json::from_slice(&bytes).map_err(|e| ConfigDecodeError::Payload(e.to_string()))
    }

    /// Encode as a URL-safe token accepted by [`SecurityConfig::decode`].
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Security input as seen by the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityPolicy {
    /// No config on the link, or the config could not be decoded.
    #[default]
    NotProvided,
    Provided(SecurityConfig),
}

impl SecurityPolicy {
    /// Decode an optional token; decode failures fall back to `NotProvided`.
    #[must_use]
    pub fn from_token(token: Option<&str>) -> Self {
        match token.filter(|t| !t.trim().is_empty()) {
            None => Self::NotProvided,
            Some(token) => match SecurityConfig::decode(token) {
                Ok(config) => Self::Provided(config),
                Err(_) => Self::NotProvided,
            },
        }
    }

    /// Whether the violation monitor must be armed for this session.
    #[must_use]
    pub fn proctoring_required(&self) -> bool {
        match self {
            Self::NotProvided => false,
            Self::Provided(config) => !config.allow_consultation,
        }
    }

    /// Effective options, with permissive defaults when no config was given.
    #[must_use]
    pub fn effective(&self) -> SecurityConfig {
        match self {
            Self::NotProvided => SecurityConfig::default(),
            Self::Provided(config) => *config,
        }
    }

    #[must_use]
    pub fn is_provided(&self) -> bool {
        matches!(self, Self::Provided(_))
    }
}

//
// ─── SHARE LINK ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShareLinkError {
    #[error("share link is not a valid URL: {0}")]
    Url(String),

    #[error("share link has no exam id")]
    MissingShareId,

    #[error(transparent)]
    ShareId(#[from] ParseIdError),
}

/// A parsed share link: the exam share id plus its security policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    share_id: ShareId,
    security: SecurityPolicy,
}

impl ShareLink {
    #[must_use]
    pub fn new(share_id: ShareId, security: SecurityPolicy) -> Self {
        Self { share_id, security }
    }

    /// Parse a share URL such as `https://host/exam/abc123?config=...`.
    ///
    /// The share id is the last non-empty path segment. An invalid config
    /// parameter never fails parsing.
    ///
    /// # Errors
    ///
    /// Returns `ShareLinkError` when the URL is malformed or has no usable
    /// share id.
    pub fn parse(raw: &str) -> Result<Self, ShareLinkError> {
        let url = Url::parse(raw.trim()).map_err(|e| ShareLinkError::Url(e.to_string()))?;
        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .ok_or(ShareLinkError::MissingShareId)?;
        let share_id = ShareId::new(segment)?;

        let token = url
            .query_pairs()
            .find(|(key, _)| CONFIG_PARAMS.iter().any(|name| key == *name))
            .map(|(_, value)| value.into_owned());

        Ok(Self {
            share_id,
            security: SecurityPolicy::from_token(token.as_deref()),
        })
    }

    #[must_use]
    pub fn share_id(&self) -> &ShareId {
        &self.share_id
    }

    #[must_use]
    pub fn security(&self) -> SecurityPolicy {
        self.security
    }
}

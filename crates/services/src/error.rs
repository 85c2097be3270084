//! Shared error types for the services crate.
//!
//! Collaborator failures are converted at the boundary: `CatalogError` becomes
//! `LoadError`, `ScoringError` becomes `SubmissionOutcome` or
//! `SubmissionError`, and storage failures never leave `DurableSession`.

use thiserror::Error;

use exam_core::model::{AnswerError, EmailError, SessionRecordError, ShareId};
use exam_core::security::ShareLinkError;
use exam_core::state::Phase;

/// Machine-readable code the scoring service uses for a repeated attempt.
pub const DUPLICATE_SUBMISSION_CODE: &str = "DUPLICATE_SUBMISSION";

/// Errors emitted by an `ExamCatalog`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("exam not found")]
    NotFound,
    #[error("exam definition is malformed: {0}")]
    Malformed(String),
    #[error("exam catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by a `ScoringService`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoringError {
    #[error("an attempt was already submitted for this respondent")]
    DuplicateSubmission,
    #[error("scoring request timed out")]
    Timeout,
    #[error("scoring service unreachable: {0}")]
    Network(String),
    #[error("scoring service returned status {status}")]
    Server { status: u16, code: Option<String> },
    #[error("scoring response is malformed: {0}")]
    Malformed(String),
}

impl ScoringError {
    /// Failures worth one more attempt: timeouts, transport errors and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ScoringError::Timeout | ScoringError::Network(_) => true,
            ScoringError::Server { status, .. } => *status >= 500,
            ScoringError::DuplicateSubmission | ScoringError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ScoringError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScoringError::Timeout
        } else {
            ScoringError::Network(err.to_string())
        }
    }
}

/// Submission gave up. Answers stay in the session store and the call can be
/// repeated safely.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("submission failed after {attempts} attempt(s): {last}")]
pub struct SubmissionError {
    pub attempts: u32,
    pub last: ScoringError,
}

/// Fatal errors while opening a share link.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoadError {
    #[error(transparent)]
    InvalidLink(#[from] ShareLinkError),
    #[error("exam {0} not found")]
    ExamNotFound(ShareId),
    #[error("exam {share_id} is malformed: {reason}")]
    MalformedExam { share_id: ShareId, reason: String },
    #[error("exam {share_id} could not be loaded: {reason}")]
    CatalogUnavailable { share_id: ShareId, reason: String },
}

impl LoadError {
    pub(crate) fn from_catalog(share_id: ShareId, err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => LoadError::ExamNotFound(share_id),
            CatalogError::Malformed(reason) => LoadError::MalformedExam { share_id, reason },
            CatalogError::Unavailable(reason) => LoadError::CatalogUnavailable { share_id, reason },
        }
    }
}

/// Respondent-input errors from the session state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("operation requires {expected:?}, session is {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },
    #[error("submission must be requested before it is confirmed")]
    ConfirmationRequired,
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Record(#[from] SessionRecordError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_server_errors_are_transient() {
        assert!(ScoringError::Timeout.is_transient());
        assert!(ScoringError::Network("reset".into()).is_transient());
        assert!(
            ScoringError::Server {
                status: 503,
                code: None
            }
            .is_transient()
        );
        assert!(
            !ScoringError::Server {
                status: 400,
                code: None
            }
            .is_transient()
        );
        assert!(!ScoringError::DuplicateSubmission.is_transient());
    }

    #[test]
    fn catalog_errors_map_to_load_errors() {
        let id = ShareId::new("x1").unwrap();
        assert_eq!(
            LoadError::from_catalog(id.clone(), CatalogError::NotFound),
            LoadError::ExamNotFound(id)
        );
    }
}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use exam_core::model::{AttemptResult, AttemptSubmission, ShareId};

use crate::error::{DUPLICATE_SUBMISSION_CODE, ScoringError};

/// Remote scorer and the single source of truth for duplicate attempts.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Submit a finished attempt and return its score.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::DuplicateSubmission` when the respondent already
    /// has an attempt on record, or another `ScoringError` on failure.
    async fn submit_attempt(
        &self,
        share_id: &ShareId,
        attempt: &AttemptSubmission,
    ) -> Result<AttemptResult, ScoringError>;
}

/// `POST {base_url}/exam/{share_id}/submit`.
#[derive(Clone)]
pub struct HttpScoringService {
    client: Client,
    base_url: String,
}

impl HttpScoringService {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn submit_url(&self, share_id: &ShareId) -> String {
        format!(
            "{}/exam/{}/submit",
            self.base_url.trim_end_matches('/'),
            share_id
        )
    }
}

#[async_trait]
impl ScoringService for HttpScoringService {
    async fn submit_attempt(
        &self,
        share_id: &ShareId,
        attempt: &AttemptSubmission,
    ) -> Result<AttemptResult, ScoringError> {
        let response = self
            .client
            .post(self.submit_url(share_id))
            .json(attempt)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        interpret_submit_response(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

/// Map a submit response to a score or a `ScoringError`.
///
/// A body carrying `code = DUPLICATE_SUBMISSION` is a duplicate regardless of
/// the exact status the server picked.
pub(crate) fn interpret_submit_response(
    status: StatusCode,
    body: &str,
) -> Result<AttemptResult, ScoringError> {
    if status.is_success() {
        return serde_json::from_str(body).map_err(|e| ScoringError::Malformed(e.to_string()));
    }

    let code = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.code);
    if code.as_deref() == Some(DUPLICATE_SUBMISSION_CODE) {
        return Err(ScoringError::DuplicateSubmission);
    }
    Err(ScoringError::Server {
        status: status.as_u16(),
        code,
    })
}

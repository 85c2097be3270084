use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use exam_core::model::{ExamDefinition, ShareId};

use crate::error::CatalogError;

/// Read-only source of exam definitions.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Fetch the exam behind a share id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown ids, `Malformed` for
    /// payloads that fail validation, and `Unavailable` for transport errors.
    async fn fetch_exam(&self, share_id: &ShareId) -> Result<ExamDefinition, CatalogError>;
}

/// `GET {base_url}/exam/{share_id}`.
#[derive(Clone)]
pub struct HttpExamCatalog {
    client: Client,
    base_url: String,
}

impl HttpExamCatalog {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn exam_url(&self, share_id: &ShareId) -> String {
        format!("{}/exam/{}", self.base_url.trim_end_matches('/'), share_id)
    }
}

#[async_trait]
impl ExamCatalog for HttpExamCatalog {
    async fn fetch_exam(&self, share_id: &ShareId) -> Result<ExamDefinition, CatalogError> {
        let response = self
            .client
            .get(self.exam_url(share_id))
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        parse_exam_response(status, &body)
    }
}

/// Interpret a catalog response. Anything that is not a valid exam is
/// "not found" or "malformed"; neither is retried.
pub(crate) fn parse_exam_response(
    status: StatusCode,
    body: &str,
) -> Result<ExamDefinition, CatalogError> {
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(CatalogError::NotFound);
    }
    if !status.is_success() {
        return Err(CatalogError::Unavailable(format!("status {status}")));
    }
    if body.trim().is_empty() || body.trim() == "null" {
        return Err(CatalogError::NotFound);
    }
    serde_json::from_str(body).map_err(|e| CatalogError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_empty_bodies_mean_missing_exam() {
        assert_eq!(
            parse_exam_response(StatusCode::NOT_FOUND, "").unwrap_err(),
            CatalogError::NotFound
        );
        assert_eq!(
            parse_exam_response(StatusCode::OK, "null").unwrap_err(),
            CatalogError::NotFound
        );
    }

    #[test]
    fn invalid_definition_is_malformed() {
        let body = r#"{"title": "T", "durationMinutes": 10, "questions": []}"#;
        assert!(matches!(
            parse_exam_response(StatusCode::OK, body),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[test]
    fn valid_definition_parses() {
        let body = r#"{
            "title": "T",
            "durationMinutes": 10,
            "questions": [{"prompt": "Q", "correctIndex": 1, "kind": "trueFalse"}]
        }"#;
        let exam = parse_exam_response(StatusCode::OK, body).unwrap();
        assert_eq!(exam.question_count(), 1);
    }

    #[test]
    fn builds_exam_url() {
        let catalog = HttpExamCatalog::new(Client::new(), "https://api.example/");
        let id = ShareId::new("abc").unwrap();
        assert_eq!(catalog.exam_url(&id), "https://api.example/exam/abc");
    }
}

use serde::{Deserialize, Serialize};

/// Body of a submit call: the ordered answers and the respondent email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSubmission {
    pub answers: Vec<i32>,
    pub email: String,
}

/// Score returned by the scoring service.
///
/// Only ever produced by deserialising a successful submit response; the
/// client never scores locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
}

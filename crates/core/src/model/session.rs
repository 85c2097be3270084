use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{RespondentEmail, ShareId};
use crate::state::EndReason;
use crate::time::elapsed_seconds;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionRecordError {
    #[error("session duration must be > 0 seconds")]
    InvalidDuration,

    #[error("session must track at least one answer")]
    NoAnswers,
}

/// Durable snapshot of one in-progress attempt.
///
/// `started_at` is fixed at creation; only `answers` change afterwards, plus
/// the ending reason once the attempt has been closed. Remaining time is
/// always derived from `started_at`, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    exam_id: ShareId,
    start_instant: DateTime<Utc>,
    duration_seconds: i64,
    answers: Vec<i32>,
    respondent_email: RespondentEmail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ending_reason: Option<EndReason>,
}

impl SessionRecord {
    /// Create a record for a freshly started attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionRecordError` for a non-positive duration or an empty
    /// answer array.
    pub fn new(
        exam_id: ShareId,
        start_instant: DateTime<Utc>,
        duration_seconds: i64,
        answers: Vec<i32>,
        respondent_email: RespondentEmail,
    ) -> Result<Self, SessionRecordError> {
        if duration_seconds <= 0 {
            return Err(SessionRecordError::InvalidDuration);
        }
        if answers.is_empty() {
            return Err(SessionRecordError::NoAnswers);
        }
        Ok(Self {
            exam_id,
            start_instant,
            duration_seconds,
            answers,
            respondent_email,
            ending_reason: None,
        })
    }

    #[must_use]
    pub fn exam_id(&self) -> &ShareId {
        &self.exam_id
    }

    #[must_use]
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start_instant
    }

    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    #[must_use]
    pub fn answers(&self) -> &[i32] {
        &self.answers
    }

    #[must_use]
    pub fn respondent_email(&self) -> &RespondentEmail {
        &self.respondent_email
    }

    /// Set once the attempt has left `InProgress`. A record carrying a reason
    /// is resumed for submission only, never for more answering.
    #[must_use]
    pub fn ending_reason(&self) -> Option<EndReason> {
        self.ending_reason
    }

    /// Record why the attempt ended. The first reason sticks.
    pub fn mark_ending(&mut self, reason: EndReason) {
        self.ending_reason.get_or_insert(reason);
    }

    /// True once `now - start_instant` exceeds the exam duration.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        elapsed_seconds(self.start_instant, now) >= self.duration_seconds
    }

    /// Replace the answer snapshot. The start instant is never touched.
    pub fn replace_answers(&mut self, answers: &[i32]) {
        self.answers.clear();
        self.answers.extend_from_slice(answers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn record() -> SessionRecord {
        SessionRecord::new(
            ShareId::new("exam1").unwrap(),
            fixed_now(),
            1800,
            vec![-1, -1],
            RespondentEmail::parse("a@b.com").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn expiry_is_derived_from_start_instant() {
        let rec = record();
        assert!(!rec.is_expired_at(fixed_now() + Duration::minutes(29)));
        assert!(rec.is_expired_at(fixed_now() + Duration::minutes(30)));
    }

    #[test]
    fn replacing_answers_keeps_start() {
        let mut rec = record();
        rec.replace_answers(&[1, -1]);
        assert_eq!(rec.answers(), &[1, -1]);
        assert_eq!(rec.start_instant(), fixed_now());
    }

    #[test]
    fn ending_reason_is_kept_and_round_trips() {
        let mut rec = record();
        assert_eq!(rec.ending_reason(), None);
        assert!(serde_json::to_value(&rec).unwrap().get("endingReason").is_none());

        rec.mark_ending(EndReason::Violation);
        rec.mark_ending(EndReason::TimeExpired);
        assert_eq!(rec.ending_reason(), Some(EndReason::Violation));

        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains(r#""endingReason":"violation""#));
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn serialises_with_wire_field_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["examId"], "exam1");
        assert_eq!(json["durationSeconds"], 1800);
        assert_eq!(json["respondentEmail"], "a@b.com");
    }

    #[test]
    fn rejects_zero_duration() {
        let err = SessionRecord::new(
            ShareId::new("e").unwrap(),
            fixed_now(),
            0,
            vec![-1],
            RespondentEmail::parse("a@b.com").unwrap(),
        )
        .unwrap_err();
        assert_eq!(err, SessionRecordError::InvalidDuration);
    }
}

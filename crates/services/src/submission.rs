use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{AttemptResult, AttemptSubmission, RespondentEmail, ShareId};
use exam_core::state::EndReason;

use crate::error::{ScoringError, SubmissionError};
use crate::scoring::ScoringService;

//
// ─── PENDING SUBMISSION ────────────────────────────────────────────────────────
//

/// Answer snapshot captured when a session enters `Ending`.
///
/// Owning the snapshot lets the submit call run without borrowing the
/// session, so the state machine keeps receiving events while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    share_id: ShareId,
    reason: EndReason,
    answers: Vec<i32>,
    email: RespondentEmail,
}

impl PendingSubmission {
    #[must_use]
    pub fn new(
        share_id: ShareId,
        reason: EndReason,
        answers: Vec<i32>,
        email: RespondentEmail,
    ) -> Self {
        Self {
            share_id,
            reason,
            answers,
            email,
        }
    }

    #[must_use]
    pub fn share_id(&self) -> &ShareId {
        &self.share_id
    }

    #[must_use]
    pub fn reason(&self) -> EndReason {
        self.reason
    }

    #[must_use]
    pub fn answers(&self) -> &[i32] {
        &self.answers
    }

    #[must_use]
    pub fn email(&self) -> &RespondentEmail {
        &self.email
    }

    #[must_use]
    pub fn to_attempt(&self) -> AttemptSubmission {
        AttemptSubmission {
            answers: self.answers.clone(),
            email: self.email.to_string(),
        }
    }
}

//
// ─── OUTCOME ───────────────────────────────────────────────────────────────────
//

/// Terminal success as far as the respondent is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Scored(AttemptResult),
    /// The server already had an attempt for this email. Not retried.
    AlreadySubmitted,
}

//
// ─── PROTOCOL ──────────────────────────────────────────────────────────────────
//

/// Timeout and retry limits for one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub attempt_timeout: Duration,
    /// Total attempts including the first; `2` means retry once.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            max_attempts: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Sends a finished attempt to the scoring service.
///
/// Idempotency is the server's job: calling `submit` again with the same
/// snapshot is harmless because a repeat comes back as a duplicate, which
/// this protocol reports as `AlreadySubmitted`.
pub struct SubmissionProtocol {
    scoring: Arc<dyn ScoringService>,
    policy: SubmissionPolicy,
}

impl SubmissionProtocol {
    #[must_use]
    pub fn new(scoring: Arc<dyn ScoringService>) -> Self {
        Self {
            scoring,
            policy: SubmissionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SubmissionPolicy) -> Self {
        self.policy = SubmissionPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    #[must_use]
    pub fn policy(&self) -> SubmissionPolicy {
        self.policy
    }

    /// Submit the snapshot, retrying transient failures up to the policy limit.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError` once attempts are exhausted or a
    /// non-transient failure occurs. A duplicate is never an error.
    pub async fn submit(
        &self,
        pending: &PendingSubmission,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let attempt = pending.to_attempt();
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let call = self.scoring.submit_attempt(&pending.share_id, &attempt);
            let result = match tokio::time::timeout(self.policy.attempt_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ScoringError::Timeout),
            };

            match result {
                Ok(score) => {
                    tracing::info!(
                        share_id = %pending.share_id,
                        reason = %pending.reason,
                        attempts,
                        "attempt scored"
                    );
                    return Ok(SubmissionOutcome::Scored(score));
                }
                Err(ScoringError::DuplicateSubmission) => {
                    tracing::info!(
                        share_id = %pending.share_id,
                        reason = %pending.reason,
                        "attempt already on record"
                    );
                    return Ok(SubmissionOutcome::AlreadySubmitted);
                }
                Err(err) if err.is_transient() && attempts < self.policy.max_attempts => {
                    tracing::warn!(
                        share_id = %pending.share_id,
                        attempts,
                        error = %err,
                        "submission failed, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(err) => {
                    tracing::warn!(
                        share_id = %pending.share_id,
                        attempts,
                        error = %err,
                        "submission failed"
                    );
                    return Err(SubmissionError {
                        attempts,
                        last: err,
                    });
                }
            }
        }
    }
}

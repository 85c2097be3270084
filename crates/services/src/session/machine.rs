use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use exam_core::model::{AnswerSheet, ExamDefinition, RespondentEmail, SessionRecord, ShareId};
use exam_core::monitor::{PageSignal, Violation, ViolationMonitor};
use exam_core::security::{SecurityPolicy, ShareLink};
use exam_core::state::{Completion, EndReason, Phase, SessionState};
use exam_core::timer::{Countdown, TimerEvent};

use crate::error::{SessionError, SubmissionError};
use crate::persistence::DurableSession;
use crate::submission::{PendingSubmission, SubmissionOutcome, SubmissionProtocol};

/// Observer notified when proctoring detects a violation.
pub type ViolationHook = Arc<dyn Fn(Violation) + Send + Sync>;

/// Data for the "submit now?" confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualSubmitPrompt {
    pub answered: usize,
    pub unanswered: usize,
    pub total: usize,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// The exam session state machine.
///
/// Owns the countdown, answer sheet and violation monitor, and decides when
/// the attempt ends. Every ending trigger (manual confirm, timer expiry,
/// violation) goes through one guard, so the first trigger wins and the rest
/// are no-ops. The answer snapshot is captured synchronously at that moment.
pub struct ExamSession {
    share_id: ShareId,
    exam: Arc<ExamDefinition>,
    security: SecurityPolicy,
    state: SessionState,
    answers: AnswerSheet,
    record: Option<SessionRecord>,
    countdown: Option<Countdown>,
    monitor: ViolationMonitor,
    persistence: DurableSession,
    protocol: Arc<SubmissionProtocol>,
    confirmation_pending: bool,
    pending: Option<PendingSubmission>,
    violation_hook: Option<ViolationHook>,
}

impl ExamSession {
    /// A fresh session waiting for the respondent to start.
    #[must_use]
    pub fn new(
        link: &ShareLink,
        exam: Arc<ExamDefinition>,
        persistence: DurableSession,
        protocol: Arc<SubmissionProtocol>,
    ) -> Self {
        Self {
            share_id: link.share_id().clone(),
            answers: AnswerSheet::blank(&exam),
            exam,
            security: link.security(),
            state: SessionState::NotStarted,
            record: None,
            countdown: None,
            monitor: ViolationMonitor::new(),
            persistence,
            protocol,
            confirmation_pending: false,
            pending: None,
            violation_hook: None,
        }
    }

    /// Rebuild a session from a stored record.
    ///
    /// The countdown resumes from the stored start instant. If the deadline
    /// already passed, the session moves straight to `Ending(TimeExpired)`
    /// with the recovered answers queued for submission. A record that was
    /// already ending resumes in `Ending` with its stored reason.
    pub(crate) fn rehydrate(
        mut self,
        record: SessionRecord,
        answers: AnswerSheet,
        now: DateTime<Utc>,
    ) -> Self {
        self.answers = answers;
        self.state = SessionState::InProgress;
        self.countdown = Some(Countdown::new(
            record.start_instant(),
            record.duration_seconds(),
        ));
        let ending = record.ending_reason();
        self.record = Some(record);
        if let Some(reason) = ending {
            tracing::info!(share_id = %self.share_id, %reason, "resuming unfinished submission");
            self.begin_ending(reason);
            return self;
        }
        tracing::info!(share_id = %self.share_id, "resuming stored session");
        self.arm(now);
        self
    }

    /// Install an observer for violations. Takes effect on the next arm.
    #[must_use]
    pub fn with_violation_hook(mut self, hook: ViolationHook) -> Self {
        self.violation_hook = Some(hook);
        self
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn share_id(&self) -> &ShareId {
        &self.share_id
    }

    #[must_use]
    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    #[must_use]
    pub fn security(&self) -> SecurityPolicy {
        self.security
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    #[must_use]
    pub fn protocol(&self) -> Arc<SubmissionProtocol> {
        Arc::clone(&self.protocol)
    }

    #[must_use]
    pub fn is_proctored(&self) -> bool {
        self.monitor.is_armed()
    }

    #[must_use]
    pub fn confirmation_pending(&self) -> bool {
        self.confirmation_pending
    }

    #[must_use]
    pub fn has_pending_submission(&self) -> bool {
        self.pending.is_some()
    }

    /// True while the store is behind the in-memory answers.
    #[must_use]
    pub fn storage_degraded(&self) -> bool {
        self.persistence.is_degraded()
    }

    /// Remaining seconds, or the full duration before the session starts.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        match &self.countdown {
            Some(countdown) => countdown.remaining_seconds(now),
            None => self.exam.duration_seconds(),
        }
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// `NotStarted -> InProgress`: record the start instant and arm timing
    /// and proctoring.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WrongPhase` if already started, or
    /// `SessionError::Email` for an invalid address.
    pub async fn start(&mut self, email: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.expect_phase(Phase::NotStarted)?;
        let email = RespondentEmail::parse(email)?;

        let record = SessionRecord::new(
            self.share_id.clone(),
            now,
            self.exam.duration_seconds(),
            self.answers.answers().to_vec(),
            email,
        )?;
        self.persistence.save(&record).await;
        self.countdown = Some(Countdown::new(now, record.duration_seconds()));
        self.record = Some(record);
        self.set_state(SessionState::InProgress);
        tracing::info!(share_id = %self.share_id, "exam started");
        self.arm(now);
        Ok(())
    }

    /// Record an answer and persist the new snapshot. Returns `false` when
    /// the value was already set, in which case nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WrongPhase` outside `InProgress`, or
    /// `SessionError::Answer` for an unknown question or option.
    pub async fn set_answer(&mut self, index: usize, value: i32) -> Result<bool, SessionError> {
        self.expect_phase(Phase::InProgress)?;
        if !self.answers.set(index, value)? {
            return Ok(false);
        }
        if let Some(record) = self.record.as_mut() {
            record.replace_answers(self.answers.answers());
            self.persistence.save(record).await;
        }
        Ok(true)
    }

    /// Advance the countdown; expiry ends the session.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TimerEvent> {
        if !self.state.is_in_progress() {
            return None;
        }
        let event = self.countdown.as_mut()?.poll(now)?;
        if event == TimerEvent::Expired {
            self.begin_ending(EndReason::TimeExpired);
        }
        Some(event)
    }

    /// Feed a page-level signal to the violation monitor. A signal that
    /// arrives after the deadline ends the session as `TimeExpired` instead.
    pub fn page_signal(&mut self, signal: PageSignal, now: DateTime<Utc>) -> Option<Violation> {
        if !self.state.is_in_progress() {
            return None;
        }
        if self.countdown.as_ref().is_some_and(|c| c.is_expired(now)) {
            let _ = self.tick(now);
            return None;
        }
        let violation = self.monitor.observe(signal, now)?;
        self.begin_ending(EndReason::Violation);
        Some(violation)
    }

    /// First phase of a manual submit: ask the respondent to confirm.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WrongPhase` outside `InProgress`.
    pub fn request_manual_submit(&mut self) -> Result<ManualSubmitPrompt, SessionError> {
        self.expect_phase(Phase::InProgress)?;
        self.confirmation_pending = true;
        Ok(ManualSubmitPrompt {
            answered: self.answers.answered_count(),
            unanswered: self.answers.unanswered_count(),
            total: self.answers.len(),
        })
    }

    pub fn cancel_manual_submit(&mut self) {
        self.confirmation_pending = false;
    }

    /// Second phase of a manual submit. Returns `false` if another trigger
    /// already ended the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfirmationRequired` without a prior
    /// `request_manual_submit`.
    pub fn confirm_manual_submit(&mut self) -> Result<bool, SessionError> {
        if self.state.is_ending_or_done() {
            return Ok(false);
        }
        if !self.confirmation_pending {
            return Err(SessionError::ConfirmationRequired);
        }
        Ok(self.begin_ending(EndReason::Manual))
    }

    /// Take the snapshot queued by the last ending transition, after the
    /// ending reason has been written to the store.
    pub async fn take_pending_submission(&mut self) -> Option<PendingSubmission> {
        let pending = self.pending.take()?;
        self.persistence.flush().await;
        Some(pending)
    }

    /// Resolve `Ending` with the result of a submit call.
    pub async fn complete_submission(
        &mut self,
        outcome: Result<SubmissionOutcome, SubmissionError>,
    ) -> &SessionState {
        let SessionState::Ending(reason) = self.state else {
            tracing::warn!(state = ?self.state, "submission result arrived outside Ending");
            return &self.state;
        };

        match outcome {
            Ok(outcome) => {
                let completion = match outcome {
                    SubmissionOutcome::Scored(result) => Completion::Scored(result),
                    SubmissionOutcome::AlreadySubmitted => Completion::AlreadySubmitted,
                };
                self.persistence.clear().await;
                self.set_state(SessionState::Submitted { reason, completion });
            }
            Err(err) => {
                // Make sure the answers survive a reload before reporting.
                self.persistence.flush().await;
                self.set_state(SessionState::SubmissionError {
                    reason,
                    message: err.to_string(),
                });
            }
        }
        &self.state
    }

    /// Submit the queued snapshot and resolve `Ending`. Returns `None` when
    /// nothing was queued.
    pub async fn submit_pending(&mut self) -> Option<&SessionState> {
        let pending = self.take_pending_submission().await?;
        let outcome = self.protocol.submit(&pending).await;
        Some(self.complete_submission(outcome).await)
    }

    /// `SubmissionError -> Ending(reason)`: queue the stored answers again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WrongPhase` unless the last submission failed.
    pub fn retry_submission(&mut self) -> Result<(), SessionError> {
        let SessionState::SubmissionError { reason, .. } = self.state else {
            return Err(self.wrong_phase(Phase::SubmissionError));
        };
        self.set_state(SessionState::Ending(reason));
        self.queue_snapshot(reason);
        tracing::info!(share_id = %self.share_id, %reason, "retrying submission");
        Ok(())
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    /// The single ending guard. Only `InProgress` can end.
    fn begin_ending(&mut self, reason: EndReason) -> bool {
        if !self.state.is_in_progress() {
            tracing::debug!(share_id = %self.share_id, %reason, state = ?self.state, "ending trigger ignored");
            return false;
        }
        self.monitor.disarm();
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.disarm();
        }
        self.confirmation_pending = false;
        self.set_state(SessionState::Ending(reason));
        self.queue_snapshot(reason);
        tracing::info!(share_id = %self.share_id, %reason, "exam ending");
        true
    }

    fn queue_snapshot(&mut self, reason: EndReason) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        record.mark_ending(reason);
        self.persistence.stage(record);
        self.pending = Some(PendingSubmission::new(
            self.share_id.clone(),
            reason,
            self.answers.answers().to_vec(),
            record.respondent_email().clone(),
        ));
    }

    /// Arm timing and proctoring for an in-progress session, ending it at
    /// once if the deadline is already behind us.
    fn arm(&mut self, now: DateTime<Utc>) {
        let expired = match self.countdown.as_mut() {
            Some(countdown) => {
                countdown.arm();
                countdown.is_expired(now)
            }
            None => false,
        };
        if expired {
            let _ = self.tick(now);
            return;
        }
        if self.security.proctoring_required() {
            let hook = self.violation_hook.clone();
            let share_id = self.share_id.clone();
            self.monitor.arm(move |violation| {
                tracing::warn!(share_id = %share_id, kind = %violation.kind, "proctoring violation");
                if let Some(hook) = hook.as_ref() {
                    hook(violation);
                }
            });
        }
    }

    fn set_state(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(next) => self.state = next,
            Err(err) => tracing::error!(error = %err, "rejected session transition"),
        }
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), SessionError> {
        if self.state.phase() == expected {
            Ok(())
        } else {
            Err(self.wrong_phase(expected))
        }
    }

    fn wrong_phase(&self, expected: Phase) -> SessionError {
        SessionError::WrongPhase {
            expected,
            actual: self.state.phase(),
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("share_id", &self.share_id)
            .field("state", &self.state)
            .field("answers", &self.answers.answers())
            .field("monitor", &self.monitor)
            .field("confirmation_pending", &self.confirmation_pending)
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

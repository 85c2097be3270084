//! Session lifecycle states and the table of allowed transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::AttemptResult;

/// Why a session left `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Manual,
    TimeExpired,
    Violation,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndReason::Manual => "manual",
            EndReason::TimeExpired => "time_expired",
            EndReason::Violation => "violation",
        };
        f.write_str(label)
    }
}

/// How a submission reached the terminal success state.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// This client's submission was scored.
    Scored(AttemptResult),
    /// The scoring service already holds an attempt for this respondent.
    AlreadySubmitted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Ending(EndReason),
    Submitted {
        reason: EndReason,
        completion: Completion,
    },
    /// Submission failed; answers are still in the session store.
    SubmissionError { reason: EndReason, message: String },
}

/// Discriminant of [`SessionState`], used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NotStarted,
    InProgress,
    Ending,
    Submitted,
    SubmissionError,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid session transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl Phase {
    /// The allowed-transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::NotStarted, Phase::InProgress)
                | (Phase::InProgress, Phase::Ending)
                | (Phase::Ending, Phase::Submitted)
                | (Phase::Ending, Phase::SubmissionError)
                | (Phase::SubmissionError, Phase::Ending)
        )
    }
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::NotStarted => Phase::NotStarted,
            SessionState::InProgress => Phase::InProgress,
            SessionState::Ending(_) => Phase::Ending,
            SessionState::Submitted { .. } => Phase::Submitted,
            SessionState::SubmissionError { .. } => Phase::SubmissionError,
        }
    }

    /// The end reason once the session has left `InProgress`.
    #[must_use]
    pub fn end_reason(&self) -> Option<EndReason> {
        match self {
            SessionState::Ending(reason)
            | SessionState::Submitted { reason, .. }
            | SessionState::SubmissionError { reason, .. } => Some(*reason),
            SessionState::NotStarted | SessionState::InProgress => None,
        }
    }

    /// True while a submission is pending or in flight, or after it finished.
    /// Every ending trigger checks this first.
    #[must_use]
    pub fn is_ending_or_done(&self) -> bool {
        matches!(
            self,
            SessionState::Ending(_) | SessionState::Submitted { .. }
        )
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self, SessionState::Submitted { .. })
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SessionState::InProgress)
    }

    /// Check `next` against the transition table.
    ///
    /// A retry out of `SubmissionError` must keep its original reason.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the table does not allow the move.
    pub fn transition(&self, next: SessionState) -> Result<SessionState, TransitionError> {
        let err = TransitionError {
            from: self.phase(),
            to: next.phase(),
        };
        if !self.phase().can_transition_to(next.phase()) {
            return Err(err);
        }
        if let (
            SessionState::SubmissionError { reason: was, .. },
            SessionState::Ending(now),
        ) = (self, &next)
        {
            if was != now {
                return Err(err);
            }
        }
        if let (SessionState::Ending(was), Some(now)) = (self, next.end_reason()) {
            if *was != now {
                return Err(err);
            }
        }
        Ok(next)
    }
}

use exam_core::model::{AttemptResult, ExamDefinition, UNANSWERED};
use exam_core::state::{Completion, EndReason, SessionState};

use super::machine::ExamSession;

/// One line of the answer key shown after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKeyEntry {
    pub question: usize,
    pub prompt: String,
    pub correct_index: i64,
    pub correct_label: Option<String>,
    pub selected: Option<i32>,
}

/// What the respondent may see once the attempt is over.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDisclosure {
    pub reason: EndReason,
    pub already_submitted: bool,
    /// Present only when the config allows showing the score and this client
    /// received one.
    pub score: Option<AttemptResult>,
    pub answer_key: Option<Vec<AnswerKeyEntry>>,
}

impl ExamSession {
    /// Post-submission view, filtered by the effective security config.
    /// `None` until the session reaches `Submitted`.
    #[must_use]
    pub fn disclosure(&self) -> Option<ResultDisclosure> {
        let SessionState::Submitted { reason, completion } = self.state() else {
            return None;
        };
        let config = self.security().effective();

        let score = match completion {
            Completion::Scored(result) if config.show_score_at_end => Some(result.clone()),
            _ => None,
        };
        let answer_key = config
            .show_correct_answers_at_end
            .then(|| answer_key(self.exam(), self.answers().answers()));

        Some(ResultDisclosure {
            reason: *reason,
            already_submitted: matches!(completion, Completion::AlreadySubmitted),
            score,
            answer_key,
        })
    }
}

fn answer_key(exam: &ExamDefinition, answers: &[i32]) -> Vec<AnswerKeyEntry> {
    exam.questions()
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let correct_label = usize::try_from(question.correct_index)
                .ok()
                .and_then(|c| question.option_label(c))
                .map(str::to_owned);
            AnswerKeyEntry {
                question: index,
                prompt: question.prompt.clone(),
                correct_index: question.correct_index,
                correct_label,
                selected: answers.get(index).copied().filter(|v| *v != UNANSWERED),
            }
        })
        .collect()
}

/// Respondent-facing message for states that need one.
#[must_use]
pub fn status_notice(state: &SessionState) -> Option<String> {
    let notice = match state {
        SessionState::NotStarted | SessionState::InProgress => return None,
        SessionState::Ending(_) => "Submitting your answers...".to_owned(),
        SessionState::Submitted {
            completion: Completion::AlreadySubmitted,
            ..
        } => "This exam was already submitted for your email address.".to_owned(),
        SessionState::Submitted { reason, .. } => match reason {
            EndReason::Manual => "Your exam has been submitted.".to_owned(),
            EndReason::TimeExpired => {
                "Time is up. Your answers were submitted automatically.".to_owned()
            }
            EndReason::Violation => {
                "You left the exam page, so your answers were submitted automatically.".to_owned()
            }
        },
        SessionState::SubmissionError { message, .. } => {
            format!("Your answers are saved, but submission failed ({message}). Please try again.")
        }
    };
    Some(notice)
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam title cannot be empty")]
    EmptyTitle,

    #[error("exam duration must be > 0 minutes")]
    InvalidDuration,

    #[error("exam has no questions")]
    NoQuestions,

    #[error("question {index} has an empty prompt")]
    EmptyPrompt { index: usize },

    #[error("question {index} needs at least two options")]
    TooFewOptions { index: usize },

    #[error("question {index}: correct index {correct} is out of range ({options} options)")]
    CorrectIndexOutOfRange {
        index: usize,
        correct: i64,
        options: usize,
    },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    #[serde(alias = "MultipleChoice", alias = "multiple_choice")]
    MultipleChoice,
    #[serde(alias = "TrueFalse", alias = "true_false")]
    TrueFalse,
}

/// A single exam question as served by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_index: i64,
    pub kind: QuestionKind,
}

impl Question {
    /// Number of selectable options. True/false questions always have two.
    #[must_use]
    pub fn option_count(&self) -> usize {
        match self.kind {
            QuestionKind::TrueFalse => 2,
            QuestionKind::MultipleChoice => self.options.as_ref().map_or(0, Vec::len),
        }
    }

    /// Label for the option at `index`, if any.
    #[must_use]
    pub fn option_label(&self, index: usize) -> Option<&str> {
        if let Some(label) = self.options.as_ref().and_then(|o| o.get(index)) {
            return Some(label.as_str());
        }
        match (self.kind, index) {
            (QuestionKind::TrueFalse, 0) => Some("True"),
            (QuestionKind::TrueFalse, 1) => Some("False"),
            _ => None,
        }
    }

    fn validate(&self, index: usize) -> Result<(), ExamError> {
        if self.prompt.trim().is_empty() {
            return Err(ExamError::EmptyPrompt { index });
        }
        let options = self.option_count();
        if options < 2 {
            return Err(ExamError::TooFewOptions { index });
        }
        let in_range = usize::try_from(self.correct_index).is_ok_and(|c| c < options);
        if !in_range {
            return Err(ExamError::CorrectIndexOutOfRange {
                index,
                correct: self.correct_index,
                options,
            });
        }
        Ok(())
    }
}

//
// ─── EXAM ──────────────────────────────────────────────────────────────────────
//

/// Unvalidated exam payload, exactly as the catalog returns it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: i64,
    pub questions: Vec<Question>,
}

/// Read-only exam definition. Questions are non-empty and never change once
/// a session has been created from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExamDraft", into = "ExamDraft")]
pub struct ExamDefinition {
    title: String,
    description: String,
    duration_minutes: i64,
    questions: Vec<Question>,
}

impl TryFrom<ExamDraft> for ExamDefinition {
    type Error = ExamError;

    fn try_from(draft: ExamDraft) -> Result<Self, Self::Error> {
        Self::new(
            draft.title,
            draft.description,
            draft.duration_minutes,
            draft.questions,
        )
    }
}

impl From<ExamDefinition> for ExamDraft {
    fn from(exam: ExamDefinition) -> Self {
        Self {
            title: exam.title,
            description: exam.description,
            duration_minutes: exam.duration_minutes,
            questions: exam.questions,
        }
    }
}

impl ExamDefinition {
    /// Build a validated exam definition.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` when the title is blank, the duration is not
    /// positive, there are no questions, or any question is inconsistent.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        duration_minutes: i64,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ExamError::EmptyTitle);
        }
        if duration_minutes <= 0 {
            return Err(ExamError::InvalidDuration);
        }
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        for (index, question) in questions.iter().enumerate() {
            question.validate(index)?;
        }

        Ok(Self {
            title: title.trim().to_owned(),
            description: description.into(),
            duration_minutes,
            questions,
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }

    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.duration_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

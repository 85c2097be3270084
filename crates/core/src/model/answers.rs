use thiserror::Error;

use crate::model::exam::ExamDefinition;

/// Marker value for a question the respondent has not answered.
pub const UNANSWERED: i32 = -1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question {index} does not exist ({total} questions)")]
    QuestionOutOfRange { index: usize, total: usize },

    #[error("option {value} is not valid for question {index} ({options} options)")]
    OptionOutOfRange {
        index: usize,
        value: i32,
        options: usize,
    },

    #[error("stored answers have {found} entries, exam has {expected} questions")]
    LengthMismatch { expected: usize, found: usize },
}

/// Ordered per-question answers for one attempt.
///
/// The sheet always has exactly one slot per question. Option counts are
/// captured at construction so values can be validated without holding the
/// exam definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    answers: Vec<i32>,
    option_counts: Vec<usize>,
}

impl AnswerSheet {
    /// A blank sheet with every question unanswered.
    #[must_use]
    pub fn blank(exam: &ExamDefinition) -> Self {
        let option_counts = exam.questions().iter().map(|q| q.option_count()).collect();
        Self {
            answers: vec![UNANSWERED; exam.question_count()],
            option_counts,
        }
    }

    /// Rebuild a sheet from answers recovered from storage.
    ///
    /// Out-of-range stored values are reset to `UNANSWERED` rather than
    /// rejected; only a length mismatch means the record belongs elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::LengthMismatch` if the stored array does not have
    /// one entry per question.
    pub fn restore(exam: &ExamDefinition, stored: &[i32]) -> Result<Self, AnswerError> {
        let mut sheet = Self::blank(exam);
        if stored.len() != sheet.answers.len() {
            return Err(AnswerError::LengthMismatch {
                expected: sheet.answers.len(),
                found: stored.len(),
            });
        }
        for (index, value) in stored.iter().copied().enumerate() {
            if sheet.check(index, value).is_ok() {
                sheet.answers[index] = value;
            }
        }
        Ok(sheet)
    }

    /// Set the answer for `index`. Returns `true` when the stored value changed.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the question or option does not exist.
    pub fn set(&mut self, index: usize, value: i32) -> Result<bool, AnswerError> {
        self.check(index, value)?;
        let slot = &mut self.answers[index];
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        Ok(true)
    }

    #[must_use]
    pub fn answers(&self) -> &[i32] {
        &self.answers
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<i32> {
        self.answers.get(index).copied()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|v| **v != UNANSWERED).count()
    }

    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.answers.len() - self.answered_count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    fn check(&self, index: usize, value: i32) -> Result<(), AnswerError> {
        let total = self.answers.len();
        let options = *self
            .option_counts
            .get(index)
            .ok_or(AnswerError::QuestionOutOfRange { index, total })?;
        if value == UNANSWERED {
            return Ok(());
        }
        let valid = usize::try_from(value).is_ok_and(|v| v < options);
        if !valid {
            return Err(AnswerError::OptionOutOfRange {
                index,
                value,
                options,
            });
        }
        Ok(())
    }
}

mod answers;
mod attempt;
mod email;
mod exam;
mod ids;
mod session;

pub use answers::{AnswerError, AnswerSheet, UNANSWERED};
pub use attempt::{AttemptResult, AttemptSubmission};
pub use email::{EmailError, RespondentEmail};
pub use exam::{ExamDefinition, ExamDraft, ExamError, Question, QuestionKind};
pub use ids::{ParseIdError, ShareId};
pub use session::{SessionRecord, SessionRecordError};

#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod persistence;
pub mod scoring;
pub mod session;
pub mod submission;

pub use exam_core::Clock;

pub use catalog::{ExamCatalog, HttpExamCatalog};
pub use config::ClientConfig;
pub use error::{CatalogError, LoadError, ScoringError, SessionError, SubmissionError};
pub use persistence::DurableSession;
pub use scoring::{HttpScoringService, ScoringService};
pub use session::{
    AnswerKeyEntry, ExamSession, HostEvent, ManualSubmitPrompt, ResultDisclosure, SessionDriver,
    SessionLoader, SessionUpdate,
};
pub use submission::{PendingSubmission, SubmissionOutcome, SubmissionPolicy, SubmissionProtocol};

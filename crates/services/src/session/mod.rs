mod disclosure;
mod driver;
mod loader;
mod machine;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use disclosure::{AnswerKeyEntry, ResultDisclosure, status_notice};
pub use driver::{HostEvent, SessionDriver, SessionUpdate};
pub use loader::SessionLoader;
pub use machine::{ExamSession, ManualSubmitPrompt, ViolationHook};

use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{AnswerSheet, ExamDefinition};
use exam_core::security::ShareLink;
use storage::repository::SessionStore;

use crate::catalog::ExamCatalog;
use crate::error::LoadError;
use crate::persistence::DurableSession;
use crate::submission::SubmissionProtocol;

use super::machine::{ExamSession, ViolationHook};

/// Opens a share link: fetches the exam and resumes or discards any stored
/// session.
#[derive(Clone)]
pub struct SessionLoader {
    clock: Clock,
    catalog: Arc<dyn ExamCatalog>,
    store: Arc<dyn SessionStore>,
    protocol: Arc<SubmissionProtocol>,
    violation_hook: Option<ViolationHook>,
}

impl SessionLoader {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn ExamCatalog>,
        store: Arc<dyn SessionStore>,
        protocol: Arc<SubmissionProtocol>,
    ) -> Self {
        Self {
            clock,
            catalog,
            store,
            protocol,
            violation_hook: None,
        }
    }

    /// Observer attached to every session this loader opens.
    #[must_use]
    pub fn with_violation_hook(mut self, hook: ViolationHook) -> Self {
        self.violation_hook = Some(hook);
        self
    }

    fn session(
        &self,
        link: &ShareLink,
        exam: Arc<ExamDefinition>,
        persistence: DurableSession,
    ) -> ExamSession {
        let session = ExamSession::new(link, exam, persistence, Arc::clone(&self.protocol));
        match self.violation_hook.as_ref() {
            Some(hook) => session.with_violation_hook(Arc::clone(hook)),
            None => session,
        }
    }

    /// Parse a raw share URL and open it.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the link is invalid or the exam cannot be loaded.
    pub async fn open_url(&self, raw: &str) -> Result<ExamSession, LoadError> {
        let link = ShareLink::parse(raw)?;
        self.open(&link).await
    }

    /// Load the exam and build a session.
    ///
    /// A stored session for the same exam is resumed. If its deadline has
    /// passed, or it was already ending, the returned session is in `Ending`
    /// with the stored answers queued. A stored session for another exam, or one
    /// that does not fit this exam, is evicted.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the exam is missing, malformed, or the catalog
    /// is unreachable. No session is created in that case.
    pub async fn open(&self, link: &ShareLink) -> Result<ExamSession, LoadError> {
        let share_id = link.share_id();
        let exam = self
            .catalog
            .fetch_exam(share_id)
            .await
            .map_err(|err| LoadError::from_catalog(share_id.clone(), err))?;
        let exam = Arc::new(exam);

        let mut persistence = DurableSession::new(Arc::clone(&self.store));
        let stored = persistence.load().await;

        let Some(record) = stored else {
            return Ok(self.session(link, exam, persistence));
        };

        if record.exam_id() != share_id {
            tracing::info!(
                stored = %record.exam_id(),
                share_id = %share_id,
                "evicting session for another exam"
            );
            persistence.clear().await;
            return Ok(self.session(link, exam, persistence));
        }

        match AnswerSheet::restore(&exam, record.answers()) {
            Ok(answers) => {
                let session = self.session(link, exam, persistence);
                Ok(session.rehydrate(record, answers, self.clock.now()))
            }
            Err(err) => {
                tracing::warn!(share_id = %share_id, error = %err, "stored session does not fit exam, discarding");
                persistence.clear().await;
                Ok(self.session(link, exam, persistence))
            }
        }
    }
}

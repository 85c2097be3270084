#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use exam_core::model::{
    AttemptResult, AttemptSubmission, ExamDefinition, Question, QuestionKind, SessionRecord,
    ShareId,
};
use exam_core::security::{SecurityConfig, SecurityPolicy, ShareLink};
use exam_core::time::fixed_now;
use services::{
    CatalogError, Clock, ExamCatalog, ScoringError, ScoringService, SessionLoader,
    SubmissionPolicy, SubmissionProtocol,
};
use storage::repository::{InMemorySessionStore, SessionStore, StorageError};

pub const EXAM_ID: &str = "exam1";
pub const EMAIL: &str = "student@example.com";

pub fn t0() -> DateTime<Utc> {
    fixed_now()
}

pub fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

pub fn share_id() -> ShareId {
    ShareId::new(EXAM_ID).unwrap()
}

/// Two three-option questions, 30 minutes.
pub fn exam() -> ExamDefinition {
    let question = |prompt: &str, correct| Question {
        prompt: prompt.to_owned(),
        context: None,
        options: Some(vec!["a".into(), "b".into(), "c".into()]),
        correct_index: correct,
        kind: QuestionKind::MultipleChoice,
    };
    ExamDefinition::new("Rust basics", "", 30, vec![question("Q1", 1), question("Q2", 2)])
        .unwrap()
}

pub fn proctored() -> ShareLink {
    ShareLink::new(
        share_id(),
        SecurityPolicy::Provided(SecurityConfig {
            allow_consultation: false,
            show_score_at_end: true,
            show_correct_answers_at_end: true,
        }),
    )
}

pub fn unconfigured() -> ShareLink {
    ShareLink::new(share_id(), SecurityPolicy::NotProvided)
}

pub fn score() -> AttemptResult {
    AttemptResult {
        score: 1,
        total_questions: 2,
        percentage: 50.0,
    }
}

pub fn fast_policy() -> SubmissionPolicy {
    SubmissionPolicy {
        attempt_timeout: Duration::from_secs(5),
        max_attempts: 2,
        retry_delay: Duration::from_millis(10),
    }
}

//
// ─── FAKES ─────────────────────────────────────────────────────────────────────
//

#[derive(Default)]
pub struct StaticCatalog {
    exams: Mutex<Vec<(ShareId, ExamDefinition)>>,
}

impl StaticCatalog {
    pub fn with_exam(id: ShareId, exam: ExamDefinition) -> Arc<Self> {
        Arc::new(Self {
            exams: Mutex::new(vec![(id, exam)]),
        })
    }
}

#[async_trait]
impl ExamCatalog for StaticCatalog {
    async fn fetch_exam(&self, share_id: &ShareId) -> Result<ExamDefinition, CatalogError> {
        self.exams
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == share_id)
            .map(|(_, exam)| exam.clone())
            .ok_or(CatalogError::NotFound)
    }
}

/// Replies from a script, then succeeds with `score()`.
#[derive(Default)]
pub struct ScriptedScoring {
    replies: Mutex<VecDeque<Result<AttemptResult, ScoringError>>>,
    calls: Mutex<Vec<(ShareId, AttemptSubmission)>>,
}

impl ScriptedScoring {
    pub fn new(replies: Vec<Result<AttemptResult, ScoringError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(ShareId, AttemptSubmission)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoringService for ScriptedScoring {
    async fn submit_attempt(
        &self,
        share_id: &ShareId,
        attempt: &AttemptSubmission,
    ) -> Result<AttemptResult, ScoringError> {
        self.calls
            .lock()
            .unwrap()
            .push((share_id.clone(), attempt.clone()));
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(score()))
    }
}

/// Counts writes and can be switched off to simulate an unavailable store.
pub struct CountingStore {
    inner: InMemorySessionStore,
    saves: AtomicUsize,
    broken: Mutex<bool>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemorySessionStore::new().with_clock(Clock::fixed(t0())),
            saves: AtomicUsize::new(0),
            broken: Mutex::new(false),
        })
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }

    pub fn raw(&self) -> Option<String> {
        self.inner.raw().unwrap()
    }

    fn check(&self) -> Result<(), StorageError> {
        if *self.broken.lock().unwrap() {
            Err(StorageError::Unavailable("switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.check()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record).await
    }

    async fn load(&self) -> Result<Option<SessionRecord>, StorageError> {
        self.check()?;
        self.inner.load().await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.check()?;
        self.inner.clear().await
    }
}

pub fn loader(
    now: DateTime<Utc>,
    scoring: Arc<ScriptedScoring>,
    store: Arc<CountingStore>,
) -> SessionLoader {
    let protocol = SubmissionProtocol::new(scoring).with_policy(fast_policy());
    SessionLoader::new(
        Clock::fixed(now),
        StaticCatalog::with_exam(share_id(), exam()),
        store,
        Arc::new(protocol),
    )
}

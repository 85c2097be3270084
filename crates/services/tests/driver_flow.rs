mod common;

use common::*;
use exam_core::monitor::{PageSignal, ViolationKind};
use exam_core::state::{EndReason, SessionState};
use services::{Clock, ExamSession, HostEvent, ScoringError, SessionDriver, SessionUpdate};
use tokio::sync::mpsc;

async fn started(
    scoring: std::sync::Arc<ScriptedScoring>,
    store: std::sync::Arc<CountingStore>,
    link: exam_core::security::ShareLink,
) -> ExamSession {
    let mut session = loader(t0(), scoring, store).open(&link).await.unwrap();
    session.start(EMAIL, t0()).await.unwrap();
    session
}

fn drain(mut updates: mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn manual_submit_through_the_driver() {
    let scoring = ScriptedScoring::new(vec![]);
    let mut session = started(scoring.clone(), CountingStore::new(), proctored()).await;

    let (events, rx) = mpsc::channel(8);
    let (tx, updates) = mpsc::unbounded_channel();
    for event in [
        HostEvent::Answer {
            question: 0,
            value: 1,
        },
        HostEvent::RequestSubmit,
        HostEvent::ConfirmSubmit,
    ] {
        events.send(event).await.unwrap();
    }

    let state = SessionDriver::new(Clock::fixed(t0()))
        .run(&mut session, rx, tx)
        .await;

    assert!(matches!(
        state,
        SessionState::Submitted {
            reason: EndReason::Manual,
            ..
        }
    ));
    let updates = drain(updates);
    assert!(updates.iter().any(|u| matches!(
        u,
        SessionUpdate::ConfirmSubmit(prompt) if prompt.answered == 1
    )));
    assert_eq!(scoring.calls().len(), 1);
    assert_eq!(scoring.calls()[0].1.answers, vec![1, -1]);
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_submits_automatically() {
    let scoring = ScriptedScoring::new(vec![]);
    let store = CountingStore::new();
    let mut session = started(scoring.clone(), store.clone(), proctored()).await;
    session.set_answer(1, 2).await.unwrap();

    let (_events, rx) = mpsc::channel(1);
    let (tx, updates) = mpsc::unbounded_channel();
    let state = SessionDriver::new(Clock::fixed(t0()))
        .run(&mut session, rx, tx)
        .await;

    assert!(matches!(
        state,
        SessionState::Submitted {
            reason: EndReason::TimeExpired,
            ..
        }
    ));
    let updates = drain(updates);
    assert!(updates.contains(&SessionUpdate::Tick { remaining: 1 }));
    assert!(updates.contains(&SessionUpdate::StateChanged(SessionState::Ending(
        EndReason::TimeExpired
    ))));
    assert_eq!(scoring.calls().len(), 1);
    assert_eq!(scoring.calls()[0].1.answers, vec![-1, 2]);
    assert_eq!(store.raw(), None);
}

#[tokio::test(start_paused = true)]
async fn leaving_the_page_ends_a_proctored_exam() {
    let scoring = ScriptedScoring::new(vec![]);
    let mut session = started(scoring.clone(), CountingStore::new(), proctored()).await;

    let (events, rx) = mpsc::channel(8);
    let (tx, updates) = mpsc::unbounded_channel();
    events.send(HostEvent::Page(PageSignal::Hidden)).await.unwrap();
    events.send(HostEvent::Page(PageSignal::Blur)).await.unwrap();

    let state = SessionDriver::new(Clock::fixed(t0()))
        .run(&mut session, rx, tx)
        .await;

    assert!(matches!(
        state,
        SessionState::Submitted {
            reason: EndReason::Violation,
            ..
        }
    ));
    let violations: Vec<_> = drain(updates)
        .into_iter()
        .filter_map(|u| match u {
            SessionUpdate::ViolationDetected(v) => Some(v.kind),
            _ => None,
        })
        .collect();
    assert_eq!(violations, vec![ViolationKind::VisibilityLost]);
    assert_eq!(scoring.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_keeps_the_session_resumable() {
    let store = CountingStore::new();
    let mut session = started(ScriptedScoring::new(vec![]), store.clone(), unconfigured()).await;

    let (events, rx) = mpsc::channel(8);
    let (tx, updates) = mpsc::unbounded_channel();
    events
        .send(HostEvent::Answer {
            question: 7,
            value: 0,
        })
        .await
        .unwrap();
    events.send(HostEvent::ConfirmSubmit).await.unwrap();
    events.send(HostEvent::Close).await.unwrap();

    let state = SessionDriver::new(Clock::fixed(t0()))
        .run(&mut session, rx, tx)
        .await;

    assert_eq!(state, SessionState::InProgress);
    let rejected = drain(updates)
        .into_iter()
        .filter(|u| matches!(u, SessionUpdate::Rejected(_)))
        .count();
    assert_eq!(rejected, 2);
    assert!(store.raw().is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_submission_waits_for_retry() {
    let scoring = ScriptedScoring::new(vec![
        Err(ScoringError::Timeout),
        Err(ScoringError::Server {
            status: 503,
            code: None,
        }),
    ]);
    let mut session = started(scoring.clone(), CountingStore::new(), proctored()).await;

    let (events, rx) = mpsc::channel(8);
    let (tx, mut updates) = mpsc::unbounded_channel();
    let driver = tokio::spawn(async move {
        SessionDriver::new(Clock::fixed(t0()))
            .run(&mut session, rx, tx)
            .await
    });

    events.send(HostEvent::RequestSubmit).await.unwrap();
    events.send(HostEvent::ConfirmSubmit).await.unwrap();

    while let Some(update) = updates.recv().await {
        if let SessionUpdate::StateChanged(SessionState::SubmissionError { reason, .. }) = update {
            assert_eq!(reason, EndReason::Manual);
            break;
        }
    }
    assert_eq!(scoring.calls().len(), 2);

    events.send(HostEvent::RetrySubmit).await.unwrap();
    let state = driver.await.unwrap();
    assert!(matches!(
        state,
        SessionState::Submitted {
            reason: EndReason::Manual,
            ..
        }
    ));
    assert_eq!(scoring.calls().len(), 3);
}

//! Event loop that feeds a session from a ticker and the host.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use exam_core::Clock;
use exam_core::monitor::{PageSignal, Violation};
use exam_core::state::SessionState;
use exam_core::timer::TimerEvent;

use crate::error::SubmissionError;
use crate::submission::SubmissionOutcome;

use super::machine::{ExamSession, ManualSubmitPrompt};

type InFlight = Pin<Box<dyn Future<Output = Result<SubmissionOutcome, SubmissionError>> + Send>>;

/// Input from the page hosting the exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Answer { question: usize, value: i32 },
    Page(PageSignal),
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    RetrySubmit,
    /// The host is going away; the stored session stays resumable.
    Close,
}

/// Output for the page hosting the exam.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Tick { remaining: i64 },
    StateChanged(SessionState),
    ViolationDetected(Violation),
    ConfirmSubmit(ManualSubmitPrompt),
    Rejected(String),
}

/// Runs an `ExamSession` on a single task.
///
/// Ticks, host events and the in-flight submission are multiplexed with
/// `select!`, so expiry and violations are still received (and ignored by
/// the session's ending guard) while a submission is pending.
#[derive(Debug, Clone, Copy)]
pub struct SessionDriver {
    clock: Clock,
    tick_every: Duration,
}

impl Default for SessionDriver {
    fn default() -> Self {
        Self::new(Clock::default())
    }
}

impl SessionDriver {
    /// A fixed clock is advanced by tokio's timer, so paused-time tests can
    /// drive the countdown with `tokio::time::advance`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            tick_every: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_tick_interval(mut self, every: Duration) -> Self {
        self.tick_every = every;
        self
    }

    /// Drive `session` until it is submitted, or until the host closes while
    /// no submission is in flight. Returns the final state.
    pub async fn run(
        &self,
        session: &mut ExamSession,
        mut events: mpsc::Receiver<HostEvent>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> SessionState {
        let origin = Instant::now();
        let now = || self.now(origin);

        let mut ticker = tokio::time::interval(self.tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<InFlight> = None;
        let mut events_open = true;
        let mut last_state: Option<SessionState> = None;

        loop {
            if in_flight.is_none() {
                if let Some(pending) = session.take_pending_submission().await {
                    let protocol = session.protocol();
                    in_flight = Some(Box::pin(async move { protocol.submit(&pending).await }));
                }
            }

            if last_state.as_ref() != Some(session.state()) {
                last_state = Some(session.state().clone());
                let _ = updates.send(SessionUpdate::StateChanged(session.state().clone()));
            }

            if session.state().is_submitted() || (!events_open && in_flight.is_none()) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(TimerEvent::Tick { remaining }) = session.tick(now()) {
                        let _ = updates.send(SessionUpdate::Tick { remaining });
                    }
                }
                outcome = wait_in_flight(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    session.complete_submission(outcome).await;
                }
                event = events.recv(), if events_open => {
                    match event {
                        None | Some(HostEvent::Close) => events_open = false,
                        Some(event) => handle_event(session, event, now(), &updates).await,
                    }
                }
            }
        }

        session.state().clone()
    }

    fn now(&self, origin: Instant) -> DateTime<Utc> {
        match self.clock {
            Clock::Fixed(anchor) => {
                let elapsed = chrono::Duration::from_std(origin.elapsed()).unwrap_or_default();
                anchor + elapsed
            }
            Clock::System => self.clock.now(),
        }
    }
}

async fn wait_in_flight(
    in_flight: &mut Option<InFlight>,
) -> Result<SubmissionOutcome, SubmissionError> {
    match in_flight.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn handle_event(
    session: &mut ExamSession,
    event: HostEvent,
    now: DateTime<Utc>,
    updates: &mpsc::UnboundedSender<SessionUpdate>,
) {
    let rejected = |err: &dyn std::fmt::Display| {
        let _ = updates.send(SessionUpdate::Rejected(err.to_string()));
    };

    match event {
        HostEvent::Answer { question, value } => {
            if let Err(err) = session.set_answer(question, value).await {
                rejected(&err);
            }
        }
        HostEvent::Page(signal) => {
            if let Some(violation) = session.page_signal(signal, now) {
                let _ = updates.send(SessionUpdate::ViolationDetected(violation));
            }
        }
        HostEvent::RequestSubmit => match session.request_manual_submit() {
            Ok(prompt) => {
                let _ = updates.send(SessionUpdate::ConfirmSubmit(prompt));
            }
            Err(err) => rejected(&err),
        },
        HostEvent::ConfirmSubmit => {
            if let Err(err) = session.confirm_manual_submit() {
                rejected(&err);
            }
        }
        HostEvent::CancelSubmit => session.cancel_manual_submit(),
        HostEvent::RetrySubmit => {
            if let Err(err) = session.retry_submission() {
                rejected(&err);
            }
        }
        HostEvent::Close => {}
    }
}

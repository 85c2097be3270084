//! Countdown derived from an absolute start instant.

use chrono::{DateTime, Utc};

use crate::time::elapsed_seconds;

/// Event produced when the countdown is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Remaining whole seconds changed since the last poll.
    Tick { remaining: i64 },
    /// Time is up. Emitted once; the countdown disarms itself afterwards.
    Expired,
}

/// Exam countdown.
///
/// Remaining time is recomputed from `started_at` on every read, so a
/// countdown rebuilt from a stored start instant shows exactly what an
/// uninterrupted one would, and time spent with the session closed still
/// counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    started_at: DateTime<Utc>,
    duration_seconds: i64,
    armed: bool,
    expired_emitted: bool,
    last_remaining: Option<i64>,
}

impl Countdown {
    /// A disarmed countdown for the given start and duration.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, duration_seconds: i64) -> Self {
        Self {
            started_at,
            duration_seconds: duration_seconds.max(0),
            armed: false,
            expired_emitted: false,
            last_remaining: None,
        }
    }

    /// Start emitting events. Re-arming a countdown that already expired is a
    /// no-op: expiry is reported once per countdown.
    pub fn arm(&mut self) {
        if !self.expired_emitted {
            self.armed = true;
            self.last_remaining = None;
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    /// `max(0, duration - (now - started_at))`, computed fresh on every call.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.duration_seconds - elapsed_seconds(self.started_at, now)).max(0)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_seconds(now) == 0
    }

    /// Advance the countdown to `now`.
    ///
    /// Returns `Tick` when the remaining whole seconds differ from the last
    /// poll, `Expired` exactly once when time runs out, and `None` otherwise
    /// or while disarmed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<TimerEvent> {
        if !self.armed {
            return None;
        }
        let remaining = self.remaining_seconds(now);
        if remaining == 0 {
            self.armed = false;
            if self.expired_emitted {
                return None;
            }
            self.expired_emitted = true;
            return Some(TimerEvent::Expired);
        }
        if self.last_remaining == Some(remaining) {
            return None;
        }
        self.last_remaining = Some(remaining);
        Some(TimerEvent::Tick { remaining })
    }
}

/// Render remaining seconds as `MM:SS`, or `H:MM:SS` past an hour.
#[must_use]
pub fn format_remaining(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn remaining_is_derived_from_start() {
        let start = fixed_now();
        let countdown = Countdown::new(start, 600);
        assert_eq!(countdown.remaining_seconds(start), 600);
        assert_eq!(countdown.remaining_seconds(start + Duration::seconds(59)), 541);
        assert_eq!(countdown.remaining_seconds(start + Duration::hours(2)), 0);
    }

    #[test]
    fn resumed_countdown_matches_uninterrupted_one() {
        let start = fixed_now();
        for (duration, elapsed) in [(60, 0), (60, 59), (1800, 1740), (7200, 1), (90, 45)] {
            let now = start + Duration::seconds(elapsed);

            let mut live = Countdown::new(start, duration);
            live.arm();
            let _ = live.poll(start);

            let mut resumed = Countdown::new(start, duration);
            resumed.arm();

            assert_eq!(resumed.remaining_seconds(now), duration - elapsed);
            assert_eq!(resumed.remaining_seconds(now), live.remaining_seconds(now));
            assert_eq!(
                resumed.poll(now),
                Some(TimerEvent::Tick {
                    remaining: duration - elapsed
                })
            );
        }
    }

    #[test]
    fn expires_exactly_once() {
        let start = fixed_now();
        let mut countdown = Countdown::new(start, 2);
        countdown.arm();

        assert_eq!(
            countdown.poll(start + Duration::seconds(1)),
            Some(TimerEvent::Tick { remaining: 1 })
        );
        assert_eq!(
            countdown.poll(start + Duration::seconds(2)),
            Some(TimerEvent::Expired)
        );
        assert!(!countdown.is_armed());

        countdown.arm();
        assert_eq!(countdown.poll(start + Duration::seconds(3)), None);
    }

    #[test]
    fn repeated_poll_within_a_second_does_not_tick() {
        let start = fixed_now();
        let mut countdown = Countdown::new(start, 10);
        countdown.arm();
        assert!(countdown.poll(start).is_some());
        assert_eq!(countdown.poll(start + Duration::milliseconds(400)), None);
    }

    #[test]
    fn disarmed_countdown_is_silent() {
        let mut countdown = Countdown::new(fixed_now(), 10);
        assert_eq!(countdown.poll(fixed_now()), None);
    }

    #[test]
    fn formats_remaining_time() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(125), "02:05");
        assert_eq!(format_remaining(3725), "1:02:05");
    }
}

use chrono::{DateTime, Duration, Utc};

/// Wall-clock source for the session engine.
///
/// Elapsed exam time is always derived from `now() - started_at`, so swapping
/// in a fixed clock is enough to make timing deterministic in tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. No effect on `Clock::System`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Whole seconds elapsed since `since`, clamped at zero when the clock
    /// reads earlier than `since`.
    #[must_use]
    pub fn seconds_since(&self, since: DateTime<Utc>) -> i64 {
        elapsed_seconds(since, self.now())
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Whole seconds between `since` and `now`, never negative.
#[must_use]
pub fn elapsed_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_seconds().max(0)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.seconds_since(fixed_now()), 90);
    }

    #[test]
    fn elapsed_is_clamped_when_clock_runs_behind() {
        let start = fixed_now();
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(5)), 0);
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::System;
        clock.advance(Duration::days(1));
        assert!(!clock.is_fixed());
    }
}

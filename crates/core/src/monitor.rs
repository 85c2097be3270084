//! Proctoring: turns page-level signals into a one-shot violation.

use chrono::{DateTime, Utc};
use std::fmt;

/// Raw signal reported by the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    Hidden,
    Visible,
    Blur,
    Focus,
    BeforeUnload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    VisibilityLost,
    FocusLost,
    UnloadAttempt,
}

impl PageSignal {
    /// The violation this signal represents, if any. Regaining visibility or
    /// focus is never a violation.
    #[must_use]
    pub fn violation_kind(self) -> Option<ViolationKind> {
        match self {
            PageSignal::Hidden => Some(ViolationKind::VisibilityLost),
            PageSignal::Blur => Some(ViolationKind::FocusLost),
            PageSignal::BeforeUnload => Some(ViolationKind::UnloadAttempt),
            PageSignal::Visible | PageSignal::Focus => None,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::VisibilityLost => "page hidden",
            ViolationKind::FocusLost => "window lost focus",
            ViolationKind::UnloadAttempt => "attempted to leave the page",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub observed_at: DateTime<Utc>,
}

type ViolationCallback = Box<dyn FnMut(Violation) + Send>;

/// Edge-triggered, one-shot violation detector.
///
/// While armed, the first violating signal invokes the callback once and
/// leaves the monitor inert until the next `arm()`.
#[derive(Default)]
pub struct ViolationMonitor {
    on_violation: Option<ViolationCallback>,
    fired: Option<Violation>,
}

impl ViolationMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with a fresh callback, replacing any previous one.
    pub fn arm(&mut self, on_violation: impl FnMut(Violation) + Send + 'static) {
        self.on_violation = Some(Box::new(on_violation));
        self.fired = None;
    }

    /// Drop the callback. Signals observed afterwards are ignored.
    pub fn disarm(&mut self) {
        self.on_violation = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.on_violation.is_some()
    }

    /// The violation that fired during the current or last armed period.
    #[must_use]
    pub fn fired(&self) -> Option<Violation> {
        self.fired
    }

    /// Feed a page signal. Returns the violation if this call fired it.
    pub fn observe(&mut self, signal: PageSignal, at: DateTime<Utc>) -> Option<Violation> {
        let kind = signal.violation_kind()?;
        let mut callback = self.on_violation.take()?;
        let violation = Violation {
            kind,
            observed_at: at,
        };
        self.fired = Some(violation);
        callback(violation);
        Some(violation)
    }
}

impl fmt::Debug for ViolationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViolationMonitor")
            .field("armed", &self.is_armed())
            .field("fired", &self.fired)
            .finish()
    }
}

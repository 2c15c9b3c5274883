//! Hold-time debouncer for the unauthorized detection signal.
//!
//! ```text
//!            tick(true)                  held >= threshold && cooled down
//!  Idle ───────────────► Holding ─────────────────────────────────► Alert
//!   ▲                       │                                         │
//!   │      tick(false)      │                                         │
//!   └───────────────────────┘                                         │
//!   └──────────────── hold window restarts on next tick(true) ────────┘
//! ```
//!
//! Firing an alert ends the hold window, so a continuously true signal
//! needs a fresh full hold before it can alert again.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_secs(3);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Result of a single [`HoldDebouncer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    None,
    Alert,
}

#[derive(Debug, Clone)]
pub struct HoldDebouncer {
    hold_threshold: Duration,
    cooldown: Duration,
    hold_start: Option<Instant>,
    last_alert: Option<Instant>,
}

impl Default for HoldDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl HoldDebouncer {
    pub fn new(hold_threshold: Duration, cooldown: Duration) -> Self {
        Self {
            hold_threshold,
            cooldown,
            hold_start: None,
            last_alert: None,
        }
    }

    /// Feed the condition observed at `now`.
    ///
    /// Timestamps that run backwards are treated as zero elapsed time,
    /// which can delay an alert but never panics.
    pub fn tick(&mut self, condition: bool, now: Instant) -> AlertDecision {
        if !condition {
            self.hold_start = None;
            return AlertDecision::None;
        }

        let Some(hold_start) = self.hold_start else {
            self.hold_start = Some(now);
            return AlertDecision::None;
        };

        let held_for = now.saturating_duration_since(hold_start);
        let cooled_down = match self.last_alert {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        };

        if held_for >= self.hold_threshold && cooled_down {
            self.last_alert = Some(now);
            self.hold_start = None;
            return AlertDecision::Alert;
        }

        AlertDecision::None
    }

    /// True while a hold window is open.
    pub fn is_holding(&self) -> bool {
        self.hold_start.is_some()
    }

    pub fn hold_threshold(&self) -> Duration {
        self.hold_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

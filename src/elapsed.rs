//! Elapsed-time display for a running task.
//!
//! Three instants feed the display: when the task started, the latest clock
//! tick, and (once the task is terminal) the freeze point. The freeze point
//! wins whenever it is set, so a display read long after completion still
//! shows the true processing time.
//!
//! ```text
//! start ──────── tick ──── tick ──── freeze ──── tick ──── tick
//!   │◀──── live: tick - start ────▶│◀── frozen: freeze - start ──▶
//! ```

use std::time::Duration;
use tokio::time::Instant;

/// `freeze - start` if frozen, else `tick - start`. Never negative.
pub fn elapsed(start: Instant, tick: Instant, freeze: Option<Instant>) -> Duration {
    freeze.unwrap_or(tick).saturating_duration_since(start)
}

/// Tracks the three instants of [`elapsed`] for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedTimeTracker {
    start: Option<Instant>,
    tick: Option<Instant>,
    freeze: Option<Instant>,
}

impl ElapsedTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing at `now`. Clears any earlier freeze.
    pub fn begin(&mut self, now: Instant) {
        self.start = Some(now);
        self.tick = Some(now);
        self.freeze = None;
    }

    /// Record a clock tick. Ignored before `begin`.
    pub fn tick(&mut self, now: Instant) {
        if self.start.is_some() {
            self.tick = Some(now);
        }
    }

    /// Freeze the display at `now`. Only the first call has an effect.
    ///
    /// Returns `true` if this call set the freeze point.
    pub fn freeze(&mut self, now: Instant) -> bool {
        if self.start.is_none() || self.freeze.is_some() {
            return false;
        }
        self.freeze = Some(now);
        true
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.start
    }

    pub fn frozen_at(&self) -> Option<Instant> {
        self.freeze
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze.is_some()
    }

    /// Zero before `begin`.
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.tick) {
            (Some(start), Some(tick)) => elapsed(start, tick, self.freeze),
            _ => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// `5.0s`, `59.9s`, `1m 05s`, `12m 00s`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

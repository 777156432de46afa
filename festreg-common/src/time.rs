//! Timestamp utilities and the injectable wall clock
//!
//! Every expiry decision goes through [`remaining`], a pure function of
//! "now" and a deadline. Controllers read "now" from a [`Clock`] so tests
//! can move time without fake timers.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current UTC instant
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
///
/// Clones share the same instant, so a test can hand one clone to a
/// controller and advance time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `seconds`
    pub fn advance_secs(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    /// Move the clock forward by an arbitrary duration
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    /// Jump to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whole seconds left until `deadline`, clamped at zero
///
/// Partial seconds round up, so a countdown only shows `0` once the
/// deadline has actually been reached.
pub fn remaining(now: DateTime<Utc>, deadline: DateTime<Utc>) -> u64 {
    let left = deadline - now;
    let millis = left.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000) as u64
    }
}

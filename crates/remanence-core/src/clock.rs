//! Injectable UTC time source.
//!
//! The scoring engine receives `now` by parameter and never reads a wall
//! clock; everything else in the crate asks a shared [`Clock`] so tests can
//! pin time exactly.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// A source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current time (nanosecond resolution; formulas use whole seconds)
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to an explicit instant, settable from tests
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    /// Advance the clock by a duration
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.lock().expect("clock lock poisoned");
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

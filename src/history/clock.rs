//! Clock implementations.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

use super::traits::Clock;

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to drive expiration in tests
/// and simulations without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward. A step that would leave chrono's range is
    /// ignored.
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

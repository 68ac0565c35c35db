//! Time source used for every timestamp the store writes and every
//! staleness or nudge computation.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Used by tests and by callers that
/// replay a specific instant.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(now: DateTime<Utc>) -> Self { Self { now: Mutex::new(now) } }

  pub fn set(&self, now: DateTime<Utc>) { *self.lock() = now; }

  pub fn advance(&self, by: Duration) {
    let mut guard = self.lock();
    *guard += by;
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
    // The guarded value is a plain timestamp; a poisoned lock still holds a
    // usable one.
    self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> { *self.lock() }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn manual_clock_moves_on_demand() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance(Duration::days(2));
    assert_eq!(clock.now(), start + Duration::days(2));
    clock.set(start);
    assert_eq!(clock.now(), start);
  }
}

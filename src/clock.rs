//! Wall clock abstraction so cache expiry and history windows can be tested.

use chrono::{DateTime, Local};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Local>;
}

/// The real local-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Local> {
    Local::now()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Local>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(now: DateTime<Local>) -> Self {
    Self {
      now: std::sync::Mutex::new(now),
    }
  }

  /// Local time for a calendar date and wall time.
  pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> Self {
    use chrono::TimeZone;
    Self::new(Local.with_ymd_and_hms(year, month, day, hour, min, 0).unwrap())
  }

  pub fn advance(&self, by: chrono::Duration) {
    let mut now = self.now.lock().unwrap();
    *now += by;
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Local> {
    *self.now.lock().unwrap()
  }
}

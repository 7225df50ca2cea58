//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Local};

use crate::dates;

/// Key of a cached accessor call.
///
/// Implementors name the namespace the entry belongs to and a key that is
/// unique within it for the accessor and its arguments.
pub trait QueryKey {
  /// Namespace for grouped invalidation (e.g. "timers", "projects")
  fn namespace(&self) -> &'static str;

  /// Accessor name plus its arguments, unique within the namespace
  fn cache_key(&self) -> String;

  /// Human-readable description for logs
  fn description(&self) -> String {
    self.cache_key()
  }
}

/// How long a produced value stays valid.
#[derive(Debug, Clone, Copy)]
pub enum Expiry {
  /// A fixed time to live
  After(Duration),
  /// Time to live computed from the instant the value was produced
  Computed(fn(DateTime<Local>) -> Duration),
}

impl Expiry {
  /// Valid until the next local midnight.
  pub const UNTIL_MIDNIGHT: Expiry = Expiry::Computed(dates::until_midnight);

  pub fn hours(hours: i64) -> Self {
    Expiry::After(Duration::hours(hours))
  }

  /// Instant at which a value produced at `now` stops being valid.
  pub fn expires_at(&self, now: DateTime<Local>) -> DateTime<Local> {
    let ttl = match self {
      Expiry::After(ttl) => *ttl,
      Expiry::Computed(f) => f(now),
    };
    now + ttl
  }
}

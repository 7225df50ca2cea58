//! Calendar helpers: business-day windows, midnight, day-of-year paths.

use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDate, NaiveDateTime, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
  !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The `count` most recent weekdays, newest first, starting `offset` days
/// before `today` (an offset of 1 leaves today out).
pub fn most_recent_business_days(today: NaiveDate, count: usize, offset: u64) -> Vec<NaiveDate> {
  let mut days = Vec::with_capacity(count);
  let mut cursor = today.checked_sub_days(Days::new(offset));

  while let Some(day) = cursor {
    if days.len() >= count {
      break;
    }
    if is_business_day(day) {
      days.push(day);
    }
    cursor = day.pred_opt();
  }

  days
}

/// Time left until the next local midnight.
pub fn until_midnight(now: DateTime<Local>) -> Duration {
  let tomorrow = now
    .date_naive()
    .succ_opt()
    .and_then(|d| start_of_day(d, |t| t.and_local_timezone(Local).earliest()));

  match tomorrow {
    Some(start) => start - now,
    // End of the calendar
    None => Duration::hours(24),
  }
}

/// First whole hour of `date` that `resolve` maps to an instant. A DST gap
/// can swallow midnight.
fn start_of_day<T>(date: NaiveDate, resolve: impl Fn(NaiveDateTime) -> Option<T>) -> Option<T> {
  (0..24).find_map(|hour| date.and_hms_opt(hour, 0, 0).and_then(&resolve))
}

/// Path of the daily endpoint for a past day: `/daily/{dayOfYear}/{year}`.
pub fn daily_path(date: NaiveDate) -> String {
  format!("/daily/{}/{}", date.ordinal(), date.year())
}

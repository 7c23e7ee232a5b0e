//! Tenant-timezone calendar arithmetic. Everything the engine knows about
//! wall clocks lives here; the rest of the code deals in `NaiveDate` +
//! `TimeOfDay` and lets these helpers anchor them to real instants.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::{BusinessHours, DayHours, TimeOfDay};

/// The calendar date `now` falls on in the tenant's timezone.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Resolve a tenant-local (date, wall time) to a UTC instant.
///
/// Returns `None` for wall times inside a DST spring-forward gap — they never
/// occur on the tenant's clock. Ambiguous fall-back times resolve to the
/// earlier instant.
pub fn local_instant(date: NaiveDate, time: TimeOfDay, tz: Tz) -> Option<DateTime<Utc>> {
    let wall = NaiveTime::from_num_seconds_from_midnight_opt(time.minutes() as u32 * 60, 0)?;
    match tz.from_local_datetime(&date.and_time(wall)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _) => Some(earlier.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// The business-hours entry governing `date`, if the weekday is listed.
pub fn hours_for(date: NaiveDate, hours: &BusinessHours) -> Option<&DayHours> {
    hours.for_weekday(date.weekday())
}

/// The open window for `date`: `Some((open, close))` unless the weekday is
/// missing or marked closed.
pub fn open_window(date: NaiveDate, hours: &BusinessHours) -> Option<(TimeOfDay, TimeOfDay)> {
    let day = hours_for(date, hours)?;
    (!day.closed).then_some((day.open, day.close))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn local_date_crosses_midnight_westward() {
        // 02:00 UTC is still the previous evening in Chicago.
        let now: DateTime<Utc> = "2026-01-01T02:00:00Z".parse().unwrap();
        assert_eq!(local_date(now, Tz::America__Chicago), d("2025-12-31"));
        assert_eq!(local_date(now, Tz::UTC), d("2026-01-01"));
    }

    #[test]
    fn local_instant_plain() {
        let instant = local_instant(d("2026-06-15"), t("09:00"), Tz::America__New_York).unwrap();
        // EDT is UTC-4 in June.
        assert_eq!(instant, "2026-06-15T13:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn local_instant_dst_gap_is_none() {
        // US DST starts 2026-03-08; 02:30 never happens in New York.
        assert!(local_instant(d("2026-03-08"), t("02:30"), Tz::America__New_York).is_none());
        assert!(local_instant(d("2026-03-08"), t("03:00"), Tz::America__New_York).is_some());
    }

    #[test]
    fn local_instant_dst_fold_takes_earlier() {
        // US DST ends 2026-11-01; 01:30 happens twice. Earlier = still EDT (UTC-4).
        let instant = local_instant(d("2026-11-01"), t("01:30"), Tz::America__New_York).unwrap();
        assert_eq!(instant, "2026-11-01T05:30:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn open_window_respects_closed_flag() {
        let hours = BusinessHours {
            monday: Some(DayHours {
                open: t("09:00"),
                close: t("17:00"),
                closed: false,
            }),
            tuesday: Some(DayHours {
                open: t("09:00"),
                close: t("17:00"),
                closed: true,
            }),
            ..Default::default()
        };
        // 2026-02-09 is a Monday, 2026-02-10 a Tuesday.
        assert_eq!(
            open_window(d("2026-02-09"), &hours),
            Some((t("09:00"), t("17:00")))
        );
        assert_eq!(open_window(d("2026-02-10"), &hours), None);
        assert_eq!(open_window(d("2026-02-11"), &hours), None); // unlisted
    }
}

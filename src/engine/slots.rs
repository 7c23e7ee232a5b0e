use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::calendar;
use crate::model::*;

use super::eligibility::earliest_start;

// ── Slot Generator ────────────────────────────────────────────────

/// Enumerate candidate start times for `date`, stepping from the weekday's
/// open time by `min(durationMinutes, slotStrideMinutes)`. Every candidate
/// leaves room for the appointment plus the buffer before close:
/// `start + duration + buffer <= close`.
///
/// Candidates inside the notice window are pruned, as are same-day candidates
/// inside the rush lead window for rush-scheduled services, and wall times
/// that fall in a DST gap. Output is strictly increasing.
pub fn generate_candidate_slots(
    date: NaiveDate,
    service: &BookingService,
    settings: &BookingSettings,
    now: DateTime<Utc>,
) -> Vec<TimeOfDay> {
    let Some((open, close)) = calendar::open_window(date, &settings.business_hours) else {
        return Vec::new();
    };

    let duration = service.duration_minutes as i32;
    let tail = duration + settings.buffer_minutes as i32;
    let stride = service
        .duration_minutes
        .min(settings.slot_stride_minutes.max(1)) as i32;

    let mut floor = earliest_start(service, settings, now);
    if service.service_type.rush_scheduled()
        && date == calendar::local_date(now, settings.timezone)
    {
        let rush = now + Duration::hours(settings.rush_lead_hours as i64);
        floor = floor.max(rush);
    }

    let close = close.minutes() as i32;
    let mut slots = Vec::new();
    let mut start = open.minutes() as i32;
    while start + tail <= close {
        if let Some(time) = TimeOfDay::from_minutes(start as u16)
            && let Some(instant) = calendar::local_instant(date, time, settings.timezone)
            && instant >= floor
        {
            slots.push(time);
        }
        start += stride;
    }
    slots
}

use ulid::Ulid;

use crate::model::*;

// ── Capacity/Conflict Filter ──────────────────────────────────────

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Ms
}

/// The per-slot capacity for a service: its own override, or the tenant-wide
/// default.
pub fn slot_capacity(service: &BookingService, settings: &BookingSettings) -> u32 {
    service
        .capacity_per_slot
        .unwrap_or(settings.max_orders_per_slot)
}

/// The interval a booking starting at `time` would occupy:
/// `[start, start + duration + buffer)`.
pub fn occupied_span(time: TimeOfDay, duration_minutes: u16, buffer_minutes: u16) -> MinuteSpan {
    let start = time.minutes() as i32;
    MinuteSpan::new(
        start,
        start + duration_minutes as i32 + buffer_minutes as i32,
    )
}

/// Count confirmed bookings whose occupied interval overlaps `candidate`.
/// Each existing booking uses its own snapshotted duration. `exclude` lets a
/// reschedule ignore the booking's prior occupancy.
fn occupancy(
    existing: &[BookingRecord],
    candidate: &MinuteSpan,
    buffer_minutes: u16,
    exclude: Option<Ulid>,
) -> u32 {
    existing
        .iter()
        .filter(|b| b.is_active())
        .filter(|b| exclude != Some(b.id))
        .filter(|b| b.occupied(buffer_minutes).overlaps(candidate))
        .count() as u32
}

/// Keep the candidates whose occupancy stays strictly below the slot
/// capacity. `existing` is the day's bookings for the same service — the
/// authoritative set, re-read on every request; cached slot lists are never
/// trusted.
pub fn filter_available(
    candidates: &[TimeOfDay],
    service: &BookingService,
    settings: &BookingSettings,
    existing: &[BookingRecord],
    exclude: Option<Ulid>,
) -> Vec<TimeOfDay> {
    let capacity = slot_capacity(service, settings);
    let buffer = settings.buffer_minutes;
    candidates
        .iter()
        .copied()
        .filter(|time| {
            let candidate = occupied_span(*time, service.duration_minutes, buffer);
            occupancy(existing, &candidate, buffer, exclude) < capacity
        })
        .collect()
}

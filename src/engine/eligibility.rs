use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::calendar;
use crate::model::*;

use super::EngineError;

// ── Constraint Evaluator ──────────────────────────────────────────

/// Effective minimum notice for a service: the tenant floor or the service's
/// own lead time, whichever is larger.
pub fn notice_hours(service: &BookingService, settings: &BookingSettings) -> i64 {
    settings.min_notice_hours.max(service.lead_time_hours) as i64
}

/// The earliest instant a booking for this service may start. Adding whole
/// hours to `now` means partial-hour notice rounds up: a slot 11.5 hours out
/// sits before `now + 12h` and is rejected.
pub fn earliest_start(
    service: &BookingService,
    settings: &BookingSettings,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    now + Duration::hours(notice_hours(service, settings))
}

/// Decide whether `date` is bookable at all for `service`, independent of
/// other bookings. Pure predicate; re-evaluated at confirmation time because
/// clocks advance between listing and submission.
pub fn is_date_eligible(
    date: NaiveDate,
    service: &BookingService,
    settings: &BookingSettings,
    now: DateTime<Utc>,
) -> bool {
    let tz = settings.timezone;

    // Entire days before the notice threshold are out; the threshold day
    // itself survives here and gets slot-level pruning in the generator.
    if date < calendar::local_date(earliest_start(service, settings, now), tz) {
        return false;
    }
    let today = calendar::local_date(now, tz);
    if date > today + Duration::days(settings.max_days_ahead as i64) {
        return false;
    }
    if settings.blocked_dates.contains(&date) {
        return false;
    }
    if settings.blackout_windows.iter().any(|w| w.contains(date)) {
        return false;
    }
    calendar::open_window(date, &settings.business_hours).is_some()
}

/// ZIP allowlist gate. An empty allowlist means unrestricted.
pub fn in_service_area(zip: &str, settings: &BookingSettings) -> bool {
    settings.service_area_zips.is_empty() || settings.service_area_zips.iter().any(|z| z == zip)
}

/// Validate intake fields against the service definition. The variant must
/// match the service type, required-field hints must be satisfied, and
/// recurring/commercial requests need the matching eligibility flags.
pub fn validate_intake(
    service: &BookingService,
    settings: &BookingSettings,
    customer: &Customer,
    details: &IntakeDetails,
) -> Result<(), EngineError> {
    if customer.name.trim().is_empty() {
        return Err(EngineError::Validation("customer name is required".into()));
    }
    if customer.phone.trim().is_empty() {
        return Err(EngineError::Validation("customer phone is required".into()));
    }
    if customer.email.trim().is_empty() || !customer.email.contains('@') {
        return Err(EngineError::Validation(
            "a valid customer email is required".into(),
        ));
    }

    if details.service_type() != service.service_type {
        return Err(EngineError::Validation(format!(
            "intake details do not match service type of {}",
            service.name
        )));
    }

    if service.requires_address && details.address().is_none_or(|a| a.trim().is_empty()) {
        return Err(EngineError::Validation(
            "this service requires an address".into(),
        ));
    }
    if service.requires_zip_code && details.zip_code().is_none_or(|z| z.trim().is_empty()) {
        return Err(EngineError::Validation(
            "this service requires a ZIP code".into(),
        ));
    }
    if service.requires_load_metrics && details.load_metric().is_none() {
        return Err(EngineError::Validation(
            "this service requires a bag count or weight estimate".into(),
        ));
    }

    if details.recurring().is_some() && !(settings.recurring_enabled && service.recurring_eligible)
    {
        return Err(EngineError::Validation(
            "recurring bookings are not enabled for this service".into(),
        ));
    }
    if matches!(details, IntakeDetails::Commercial { .. }) && !service.commercial_eligible {
        return Err(EngineError::Validation(
            "this service does not take commercial bookings".into(),
        ));
    }

    Ok(())
}

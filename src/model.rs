use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::limits::*;

/// Unix milliseconds — wall-clock timestamps (`createdAt`/`updatedAt`).
pub type Ms = i64;

// ── Time of day ──────────────────────────────────────────────────

/// A tenant-local wall time, stored as minutes since midnight (< 1440).
/// Rendered and parsed as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < 24 * 60).then_some(Self(minutes))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s.split_once(':').ok_or("expected HH:MM")?;
        if h.len() != 2 || m.len() != 2 {
            return Err("expected HH:MM");
        }
        let h: u16 = h.parse().map_err(|_| "bad hour")?;
        let m: u16 = m.parse().map_err(|_| "bad minute")?;
        if h >= 24 || m >= 60 {
            return Err("hour or minute out of range");
        }
        Ok(Self(h * 60 + m))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Minute intervals ─────────────────────────────────────────────

/// Half-open interval `[start, end)` in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteSpan {
    pub start: i32,
    pub end: i32,
}

impl MinuteSpan {
    pub fn new(start: i32, end: i32) -> Self {
        debug_assert!(start < end, "MinuteSpan start must be before end");
        Self { start, end }
    }

    /// Two half-open intervals overlap iff `a.start < b.end && b.start < a.end`.
    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &MinuteSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> i32 {
        self.end - self.start
    }
}

// ── Business hours ───────────────────────────────────────────────

/// One weekday's open window, tenant-local. Invariant: `open < close`
/// unless `closed` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHours {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
    #[serde(default)]
    pub closed: bool,
}

/// Weekly schedule. Weekdays not listed are implicitly closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessHours {
    pub monday: Option<DayHours>,
    pub tuesday: Option<DayHours>,
    pub wednesday: Option<DayHours>,
    pub thursday: Option<DayHours>,
    pub friday: Option<DayHours>,
    pub saturday: Option<DayHours>,
    pub sunday: Option<DayHours>,
}

impl BusinessHours {
    pub fn for_weekday(&self, weekday: Weekday) -> Option<&DayHours> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }
}

/// A fully closed date range, inclusive of both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackoutWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BlackoutWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ── Tenant settings ──────────────────────────────────────────────

/// Tenant-wide scheduling rules, one document per tenant. Supplied by the
/// content store as JSON with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingSettings {
    /// IANA zone name; all dates and wall times are interpreted here.
    pub timezone: Tz,
    /// Gap enforced after every booking before the next may start.
    pub buffer_minutes: u16,
    pub min_notice_hours: u16,
    pub max_days_ahead: u16,
    /// Candidate start-time granularity; the effective stride is
    /// `min(durationMinutes, slotStrideMinutes)`.
    pub slot_stride_minutes: u16,
    pub default_service_type: ServiceType,
    /// ZIP allowlist; empty means unrestricted.
    pub service_area_zips: Vec<String>,
    pub blackout_windows: Vec<BlackoutWindow>,
    /// Explicit dates fully unavailable regardless of weekday.
    pub blocked_dates: Vec<NaiveDate>,
    pub rush_lead_hours: u16,
    /// Per-slot capacity when a service does not override it.
    pub max_orders_per_slot: u32,
    pub recurring_enabled: bool,
    pub business_hours: BusinessHours,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            buffer_minutes: 0,
            min_notice_hours: 0,
            max_days_ahead: 30,
            slot_stride_minutes: 30,
            default_service_type: ServiceType::Dropoff,
            service_area_zips: Vec::new(),
            blackout_windows: Vec::new(),
            blocked_dates: Vec::new(),
            rush_lead_hours: 0,
            max_orders_per_slot: 1,
            recurring_enabled: false,
            business_hours: BusinessHours::default(),
        }
    }
}

impl BookingSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_stride_minutes == 0 {
            return Err("slotStrideMinutes must be positive".into());
        }
        if self.max_orders_per_slot == 0 {
            return Err("maxOrdersPerSlot must be positive".into());
        }
        if self.max_days_ahead > MAX_DAYS_AHEAD {
            return Err(format!("maxDaysAhead exceeds {MAX_DAYS_AHEAD}"));
        }
        if self.blocked_dates.len() > MAX_BLOCKED_DATES {
            return Err(format!("more than {MAX_BLOCKED_DATES} blockedDates"));
        }
        if self.blackout_windows.len() > MAX_BLACKOUT_WINDOWS {
            return Err(format!("more than {MAX_BLACKOUT_WINDOWS} blackoutWindows"));
        }
        if self.service_area_zips.len() > MAX_SERVICE_AREA_ZIPS {
            return Err(format!("more than {MAX_SERVICE_AREA_ZIPS} serviceAreaZips"));
        }
        for window in &self.blackout_windows {
            if window.end < window.start {
                return Err("blackout window ends before it starts".into());
            }
        }
        let days = [
            self.business_hours.monday,
            self.business_hours.tuesday,
            self.business_hours.wednesday,
            self.business_hours.thursday,
            self.business_hours.friday,
            self.business_hours.saturday,
            self.business_hours.sunday,
        ];
        for day in days.into_iter().flatten() {
            if !day.closed && day.open >= day.close {
                return Err("businessHours open must be before close".into());
            }
        }
        Ok(())
    }
}

// ── Services ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    PickupDelivery,
    Dropoff,
    SelfService,
    Commercial,
}

impl ServiceType {
    /// Pickup routes are dispatched against a same-day driver schedule, so
    /// they honor the tenant's rush lead window on the current day.
    pub fn rush_scheduled(&self) -> bool {
        matches!(self, ServiceType::PickupDelivery)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    Flat,
    PerBag,
    PerPound,
    Quote,
}

/// A bookable service definition, many per tenant. Supplied by the content
/// store as JSON with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingService {
    pub id: Ulid,
    pub name: String,
    pub service_type: ServiceType,
    pub pricing_model: PricingModel,
    pub duration_minutes: u16,
    /// Service-specific minimum notice; the larger of this and the tenant's
    /// `minNoticeHours` applies.
    #[serde(default)]
    pub lead_time_hours: u16,
    /// Overrides the tenant's `maxOrdersPerSlot` when set.
    #[serde(default)]
    pub capacity_per_slot: Option<u32>,
    #[serde(default)]
    pub recurring_eligible: bool,
    #[serde(default)]
    pub commercial_eligible: bool,
    /// Inactive services generate no slots and accept no bookings.
    #[serde(default = "default_true")]
    pub active: bool,
    // Intake-form hints.
    #[serde(default)]
    pub requires_address: bool,
    #[serde(default)]
    pub requires_zip_code: bool,
    #[serde(default)]
    pub requires_load_metrics: bool,
}

fn default_true() -> bool {
    true
}

impl BookingService {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("service name is empty".into());
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err("service name too long".into());
        }
        if self.duration_minutes == 0 {
            return Err("durationMinutes must be positive".into());
        }
        if self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(format!("durationMinutes exceeds {MAX_DURATION_MINUTES}"));
        }
        if self.capacity_per_slot == Some(0) {
            return Err("capacityPerSlot must be positive when set".into());
        }
        Ok(())
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringRule {
    Weekly,
    Biweekly,
    Monthly,
}

/// Service-type-specific intake fields. One variant per `ServiceType`, each
/// carrying only the fields that type needs; the variant name is the JSON tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeDetails {
    #[serde(rename_all = "camelCase")]
    PickupDelivery {
        pickup_address: String,
        #[serde(default)]
        delivery_address: Option<String>,
        zip_code: String,
        #[serde(default)]
        bag_count: Option<u32>,
        #[serde(default)]
        recurring: Option<RecurringRule>,
    },
    #[serde(rename_all = "camelCase")]
    Dropoff {
        #[serde(default)]
        bag_count: Option<u32>,
    },
    SelfService {},
    #[serde(rename_all = "camelCase")]
    Commercial {
        business_name: String,
        address: String,
        zip_code: String,
        #[serde(default)]
        estimated_pounds: Option<u32>,
        #[serde(default)]
        recurring: Option<RecurringRule>,
    },
}

impl IntakeDetails {
    pub fn service_type(&self) -> ServiceType {
        match self {
            IntakeDetails::PickupDelivery { .. } => ServiceType::PickupDelivery,
            IntakeDetails::Dropoff { .. } => ServiceType::Dropoff,
            IntakeDetails::SelfService {} => ServiceType::SelfService,
            IntakeDetails::Commercial { .. } => ServiceType::Commercial,
        }
    }

    pub fn zip_code(&self) -> Option<&str> {
        match self {
            IntakeDetails::PickupDelivery { zip_code, .. }
            | IntakeDetails::Commercial { zip_code, .. } => Some(zip_code),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            IntakeDetails::PickupDelivery { pickup_address, .. } => Some(pickup_address),
            IntakeDetails::Commercial { address, .. } => Some(address),
            _ => None,
        }
    }

    pub fn load_metric(&self) -> Option<u32> {
        match self {
            IntakeDetails::PickupDelivery { bag_count, .. }
            | IntakeDetails::Dropoff { bag_count } => *bag_count,
            IntakeDetails::Commercial {
                estimated_pounds, ..
            } => *estimated_pounds,
            IntakeDetails::SelfService {} => None,
        }
    }

    pub fn recurring(&self) -> Option<RecurringRule> {
        match self {
            IntakeDetails::PickupDelivery { recurring, .. }
            | IntakeDetails::Commercial { recurring, .. } => *recurring,
            _ => None,
        }
    }
}

/// State machine: `confirmed → cancelled` or `confirmed → completed`;
/// no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: Ulid,
    /// Tenant the record belongs to; records never cross tenant boundaries.
    pub site_id: String,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    /// Snapshotted from the service at creation time. Later service edits
    /// must not retroactively change historical bookings.
    pub duration_minutes: u16,
    pub customer: Customer,
    pub details: IntakeDetails,
    pub status: BookingStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl BookingRecord {
    /// The interval this booking occupies for conflict accounting:
    /// `[start, start + duration + buffer)`.
    pub fn occupied(&self, buffer_minutes: u16) -> MinuteSpan {
        let start = self.time.minutes() as i32;
        MinuteSpan::new(
            start,
            start + self.duration_minutes as i32 + buffer_minutes as i32,
        )
    }

    /// Only confirmed bookings hold capacity.
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Everything `create` needs; the wire layer builds this from the INSERT.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub customer: Customer,
    pub details: IntakeDetails,
    pub notes: Option<String>,
}

// ── Per-service state ────────────────────────────────────────────

/// A service definition plus every booking ever taken for it, sorted by
/// `(date, time, id)`. Records are status-flipped, never removed.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub definition: BookingService,
    pub bookings: Vec<BookingRecord>,
}

impl ServiceState {
    pub fn new(definition: BookingService) -> Self {
        Self {
            definition,
            bookings: Vec::new(),
        }
    }

    pub fn insert_booking(&mut self, record: BookingRecord) {
        let key = (record.date, record.time, record.id);
        let pos = self
            .bookings
            .partition_point(|b| (b.date, b.time, b.id) < key);
        self.bookings.insert(pos, record);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<BookingRecord> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: &Ulid) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut BookingRecord> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// The day's bookings, via binary search on the sorted list.
    pub fn on_date(&self, date: NaiveDate) -> &[BookingRecord] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SettingsUpdated {
        settings: BookingSettings,
    },
    ServiceUpserted {
        service: BookingService,
    },
    ServiceRemoved {
        id: Ulid,
    },
    BookingCreated {
        record: BookingRecord,
    },
    BookingRescheduled {
        id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        updated_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        service_id: Ulid,
        updated_at: Ms,
    },
    BookingCompleted {
        id: Ulid,
        service_id: Ulid,
        updated_at: Ms,
    },
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

    fn dropoff_service() -> BookingService {
        serde_json::from_str(
            r#"{"id":"01ARZ3NDEKTSV4RRFFQ69G5FAV","name":"Dropoff","serviceType":"dropoff","pricingModel":"flat","durationMinutes":30}"#,
        )
        .unwrap()
    }

    #[test]
    fn time_of_day_parse_and_format() {
        assert_eq!(t("09:00").minutes(), 540);
        assert_eq!(t("23:59").minutes(), 1439);
        assert_eq!(t("00:00").minutes(), 0);
        assert_eq!(t("15:45").to_string(), "15:45");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("9:00".parse::<TimeOfDay>().is_err());
        assert!("09:60".parse::<TimeOfDay>().is_err());
        assert!("0900".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn time_of_day_json_is_string() {
        let json = serde_json::to_string(&t("08:30")).unwrap();
        assert_eq!(json, "\"08:30\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t("08:30"));
    }

    #[test]
    fn minute_span_overlap_is_half_open() {
        let a = MinuteSpan::new(540, 615); // 09:00 + 60min + 15min buffer
        let b = MinuteSpan::new(615, 690); // touches, does not overlap
        let c = MinuteSpan::new(600, 660);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
    }

    #[test]
    fn business_hours_missing_weekday_is_closed() {
        let hours = BusinessHours {
            monday: Some(DayHours {
                open: t("09:00"),
                close: t("17:00"),
                closed: false,
            }),
            ..Default::default()
        };
        assert!(hours.for_weekday(Weekday::Mon).is_some());
        assert!(hours.for_weekday(Weekday::Sun).is_none());
    }

    #[test]
    fn blackout_window_inclusive_endpoints() {
        let w = BlackoutWindow {
            start: d("2026-12-24"),
            end: d("2026-12-26"),
        };
        assert!(w.contains(d("2026-12-24")));
        assert!(w.contains(d("2026-12-25")));
        assert!(w.contains(d("2026-12-26")));
        assert!(!w.contains(d("2026-12-23")));
        assert!(!w.contains(d("2026-12-27")));
    }

    #[test]
    fn settings_validation_rejects_inverted_hours() {
        let mut settings = BookingSettings::default();
        settings.business_hours.monday = Some(DayHours {
            open: t("17:00"),
            close: t("09:00"),
            closed: false,
        });
        assert!(settings.validate().is_err());

        // A closed day may carry any times.
        settings.business_hours.monday = Some(DayHours {
            open: t("17:00"),
            close: t("09:00"),
            closed: true,
        });
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_document_roundtrip() {
        let json = r#"{
            "timezone": "America/New_York",
            "bufferMinutes": 15,
            "minNoticeHours": 12,
            "maxDaysAhead": 30,
            "maxOrdersPerSlot": 2,
            "businessHours": {
                "monday": { "open": "09:00", "close": "17:00" },
                "saturday": { "open": "10:00", "close": "14:00", "closed": true }
            },
            "blockedDates": ["2026-07-04"],
            "blackoutWindows": [{ "start": "2026-12-24", "end": "2026-12-26" }]
        }"#;
        let settings: BookingSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.timezone, Tz::America__New_York);
        assert_eq!(settings.buffer_minutes, 15);
        assert_eq!(settings.min_notice_hours, 12);
        assert_eq!(settings.max_orders_per_slot, 2);
        assert_eq!(settings.slot_stride_minutes, 30); // default
        let monday = settings.business_hours.monday.unwrap();
        assert_eq!(monday.open, t("09:00"));
        assert!(!monday.closed);
        assert!(settings.business_hours.saturday.unwrap().closed);
        assert_eq!(settings.blocked_dates, vec![d("2026-07-04")]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn service_document_roundtrip() {
        let json = r#"{
            "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "name": "Wash & Fold Pickup",
            "serviceType": "pickup_delivery",
            "pricingModel": "per_bag",
            "durationMinutes": 60,
            "leadTimeHours": 24,
            "capacityPerSlot": 3
        }"#;
        let service: BookingService = serde_json::from_str(json).unwrap();
        assert_eq!(service.service_type, ServiceType::PickupDelivery);
        assert_eq!(service.capacity_per_slot, Some(3));
        assert!(service.active); // defaults on
        assert!(service.validate().is_ok());
    }

    #[test]
    fn service_validation_rejects_zero_duration() {
        let mut service = dropoff_service();
        service.duration_minutes = 0;
        assert!(service.validate().is_err());
    }

    #[test]
    fn intake_details_tagged_by_service_type() {
        let json = r#"{
            "pickup_delivery": {
                "pickupAddress": "12 Main St",
                "zipCode": "02139",
                "bagCount": 2
            }
        }"#;
        let details: IntakeDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.service_type(), ServiceType::PickupDelivery);
        assert_eq!(details.zip_code(), Some("02139"));
        assert_eq!(details.load_metric(), Some(2));
        assert_eq!(details.recurring(), None);

        let dropoff: IntakeDetails = serde_json::from_str(r#"{"dropoff": {}}"#).unwrap();
        assert_eq!(dropoff.service_type(), ServiceType::Dropoff);
        assert_eq!(dropoff.zip_code(), None);
    }

    fn record(date: &str, time: &str, id: Ulid) -> BookingRecord {
        BookingRecord {
            id,
            site_id: "acme".into(),
            service_id: Ulid::new(),
            date: d(date),
            time: t(time),
            duration_minutes: 60,
            customer: Customer {
                name: "Ada".into(),
                phone: "555-0100".into(),
                email: "ada@example.com".into(),
            },
            details: IntakeDetails::Dropoff { bag_count: None },
            status: BookingStatus::Confirmed,
            notes: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn service_state_keeps_bookings_sorted() {
        let mut state = ServiceState::new(dropoff_service());
        state.insert_booking(record("2026-03-03", "10:00", Ulid::new()));
        state.insert_booking(record("2026-03-02", "15:00", Ulid::new()));
        state.insert_booking(record("2026-03-02", "09:00", Ulid::new()));

        let keys: Vec<_> = state.bookings.iter().map(|b| (b.date, b.time)).collect();
        assert_eq!(
            keys,
            vec![
                (d("2026-03-02"), t("09:00")),
                (d("2026-03-02"), t("15:00")),
                (d("2026-03-03"), t("10:00")),
            ]
        );

        let day = state.on_date(d("2026-03-02"));
        assert_eq!(day.len(), 2);
        assert!(state.on_date(d("2026-03-04")).is_empty());
    }

    #[test]
    fn service_state_remove_booking() {
        let mut state = ServiceState::new(dropoff_service());
        let id = Ulid::new();
        state.insert_booking(record("2026-03-02", "09:00", id));
        assert!(state.remove_booking(id).is_some());
        assert!(state.remove_booking(id).is_none());
        assert!(state.bookings.is_empty());
    }

    #[test]
    fn occupied_span_folds_in_buffer() {
        let rec = record("2026-03-02", "09:00", Ulid::new());
        let span = rec.occupied(15);
        assert_eq!(span.start, 540);
        assert_eq!(span.end, 615);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            record: record("2026-03-02", "09:00", Ulid::new()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);

        let event = Event::SettingsUpdated {
            settings: BookingSettings::default(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

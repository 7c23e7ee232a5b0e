use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::TimeOfDay;

#[derive(Debug)]
pub enum EngineError {
    /// Date fails eligibility: notice/lead window, max-days-ahead ceiling,
    /// blocked/blackout date, or closed weekday.
    DateOutOfRange(NaiveDate),
    /// Passed eligibility but the slot is full or no longer in the generated
    /// set. Expected under concurrency; callers refresh the list and retry.
    SlotUnavailable { date: NaiveDate, time: TimeOfDay },
    ServiceInactiveOrUnknown(Ulid),
    /// Booking id unresolvable.
    NotFound(Ulid),
    /// Identity proof does not match the booking's contact identity.
    Forbidden(Ulid),
    Validation(String),
    /// Service still has booking records; deactivate instead of deleting.
    HasBookings(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DateOutOfRange(date) => write!(f, "date not bookable: {date}"),
            EngineError::SlotUnavailable { date, time } => {
                write!(f, "slot {date} {time} is no longer available")
            }
            EngineError::ServiceInactiveOrUnknown(id) => {
                write!(f, "service inactive or unknown: {id}")
            }
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Forbidden(id) => {
                write!(f, "identity does not match booking: {id}")
            }
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::HasBookings(id) => {
                write!(f, "cannot delete service {id}: booking records exist")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

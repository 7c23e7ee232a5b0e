//! Hard caps on tenant-supplied data. Requests that would cross one of these
//! are rejected with `LimitExceeded` before any state changes.

pub const MAX_TENANTS: usize = 256;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_SERVICES_PER_TENANT: usize = 512;
pub const MAX_BOOKINGS_PER_SERVICE: usize = 250_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 2_000;
/// Upper bound on a settings/service/intake JSON document.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024;

pub const MAX_DURATION_MINUTES: u16 = 24 * 60;
pub const MAX_DAYS_AHEAD: u16 = 366;
pub const MAX_BLOCKED_DATES: usize = 366;
pub const MAX_BLACKOUT_WINDOWS: usize = 64;
pub const MAX_SERVICE_AREA_ZIPS: usize = 1_024;

//! Hard limits applied at the engine and protocol boundaries. Field-length limits live
//! on the request types' validation attributes in `model`.

/// Maximum number of locations a single engine will hold.
pub const MAX_LOCATIONS: usize = 1_000;

/// Maximum non-cancelled bookings plus blocked windows indexed for one location-day.
pub const MAX_INTERVALS_PER_DAY: usize = 512;

/// Longest free-text explanation for an `other` blocked window.
pub const MAX_REASON_LEN: usize = 500;

/// Upcoming-bookings lookahead when the caller gives none, in minutes.
pub const DEFAULT_LOOKAHEAD_MINUTES: i64 = 10;

/// Longest upcoming-bookings lookahead, in minutes (one day).
pub const MAX_LOOKAHEAD_MINUTES: i64 = 24 * 60;

/// Longest protocol line accepted from a client, in bytes.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Concurrent LISTEN channels per connection.
pub const MAX_LISTENS_PER_CONNECTION: usize = 64;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use validator::Validate;

/// Width of every bookable slot.
pub const SLOT_MINUTES: i64 = 30;

/// Party size used when the caller does not specify one.
pub const DEFAULT_PARTY_SIZE: u32 = 6;

/// Parse a local wall-clock time (`HH:MM` or `HH:MM:SS`).
pub fn parse_wall_clock(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
}

/// Parse a calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

/// Render a wall-clock time as `HH:MM`, keeping seconds only when present.
pub fn format_wall_clock(t: &NaiveTime) -> String {
    use chrono::Timelike;
    if t.second() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}

/// Serde adapter storing times as `HH:MM` strings (both in the WAL and on the wire).
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_wall_clock(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_wall_clock(&raw).map_err(serde::de::Error::custom)
    }
}

/// Half-open wall-clock interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    #[serde(with = "wall_clock")]
    pub start: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end: NaiveTime,
}

impl Span {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// The single conflict predicate: `s1 < e2 && s2 < e1`.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(with = "wall_clock")]
    pub hours_open: NaiveTime,
    #[serde(with = "wall_clock")]
    pub hours_close: NaiveTime,
    /// Seating capacity. Informational only: every location is single-occupancy.
    pub num_tables: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a booking in this state occupies its slot.
    pub fn occupies(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub location_id: Ulid,
    pub booking_date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub party_size: u32,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

/// Why staff closed a window. `Other` carries the free-text explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    PeakHours,
    PrivateEvent,
    Maintenance,
    Other(String),
}

impl BlockReason {
    /// Parse a reason code; `other` takes its text from `note`.
    pub fn parse(code: &str, note: Option<&str>) -> Result<Self, String> {
        match code.trim().to_lowercase().as_str() {
            "peak_hours" => Ok(BlockReason::PeakHours),
            "private_event" => Ok(BlockReason::PrivateEvent),
            "maintenance" => Ok(BlockReason::Maintenance),
            "other" => Ok(BlockReason::Other(note.unwrap_or_default().trim().to_string())),
            other => Err(format!(
                "unknown reason '{other}' (expected peak_hours, private_event, maintenance or other)"
            )),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::PeakHours => "peak_hours",
            BlockReason::PrivateEvent => "private_event",
            BlockReason::Maintenance => "maintenance",
            BlockReason::Other(_) => "other",
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            BlockReason::Other(text) => Some(text),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            BlockReason::PeakHours => "peak hours".into(),
            BlockReason::PrivateEvent => "private event".into(),
            BlockReason::Maintenance => "maintenance".into(),
            BlockReason::Other(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedWindow {
    pub id: Ulid,
    pub location_id: Ulid,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
    pub reason: BlockReason,
    pub created_by: Option<Ulid>,
    pub created_at: DateTime<Utc>,
}

impl BlockedWindow {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

/// One cell of the availability grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    #[serde(with = "wall_clock")]
    pub start: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end: NaiveTime,
    pub available: bool,
}

impl TimeSlot {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// What occupies an indexed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    /// A pending or confirmed booking.
    Booking,
    /// A staff blocked window.
    Blocked,
}

/// Occupancy index entry. Cancelled bookings are never indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub id: Ulid,
    pub span: Span,
    pub kind: IntervalKind,
}

#[derive(Debug, Clone)]
pub struct LocationState {
    pub location: Location,
    /// Every booking ever created here, cancelled ones included.
    pub bookings: HashMap<Ulid, Booking>,
    pub blocks: HashMap<Ulid, BlockedWindow>,
    /// (date → intervals) occupancy index, each day sorted by `span.start`.
    days: HashMap<NaiveDate, Vec<Interval>>,
}

impl LocationState {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            bookings: HashMap::new(),
            blocks: HashMap::new(),
            days: HashMap::new(),
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, date: NaiveDate, interval: Interval) {
        let day = self.days.entry(date).or_default();
        let pos = day
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, interval);
    }

    /// Remove interval by id.
    pub fn remove_interval(&mut self, date: NaiveDate, id: Ulid) -> Option<Interval> {
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|i| i.id == id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(removed)
    }

    pub fn day(&self, date: NaiveDate) -> &[Interval] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Return only intervals on `date` whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, date: NaiveDate, query: &Span) -> impl Iterator<Item = &Interval> {
        let day = self.day(date);
        let right_bound = day.partition_point(|i| i.span.start < query.end);
        let query_start = query.start;
        day[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query_start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    LocationCreated { location: Location },
    BookingCreated { booking: Booking },
    BookingCancelled { id: Ulid, location_id: Ulid },
    BlockCreated { block: BlockedWindow },
}

impl Event {
    pub fn location_id(&self) -> Ulid {
        match self {
            Event::LocationCreated { location } => location.id,
            Event::BookingCreated { booking } => booking.location_id,
            Event::BookingCancelled { location_id, .. } => *location_id,
            Event::BlockCreated { block } => block.location_id,
        }
    }
}

// ── Request types ────────────────────────────────────────────────

/// Input for a new location. Hours are free-form: `close <= open` simply yields no slots.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewLocation {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub address: String,
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub city: String,
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub state: String,
    #[validate(length(max = 20, message = "must be at most 20 characters"))]
    pub zip: String,
    pub hours_open: NaiveTime,
    pub hours_close: NaiveTime,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub num_tables: u32,
}

/// Input for the reservation write path.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewBooking {
    pub location_id: Ulid,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub customer_name: String,
    #[validate(
        email(message = "must be a valid email address"),
        length(max = 254, message = "must be at most 254 characters")
    )]
    pub customer_email: String,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub customer_phone: Option<String>,
    #[validate(range(min = 1, max = 50, message = "must be between 1 and 50"))]
    pub party_size: u32,
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub payment_id: Option<String>,
}

impl NewBooking {
    /// Trim free-text fields; a blank phone number or payment reference counts as absent.
    pub fn normalized(mut self) -> Self {
        self.customer_name = self.customer_name.trim().to_string();
        self.customer_email = self.customer_email.trim().to_string();
        self.customer_phone = self
            .customer_phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self.payment_id = self
            .payment_id
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self
    }
}

/// Input for the staff blocking path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub location_id: Ulid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: BlockReason,
    pub created_by: Option<Ulid>,
}

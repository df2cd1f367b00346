use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::classify_slots;
use super::Engine;

/// Drop seconds and sub-second precision.
fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

impl Engine {
    /// Every location, ordered by name (ties broken by id).
    pub async fn list_locations(&self) -> Vec<Location> {
        let mut out = Vec::with_capacity(self.store.location_count());
        for rs in self.store.location_states() {
            out.push(rs.read().await.location.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn get_location(&self, id: Ulid) -> Option<Location> {
        let rs = self.store.get_location(&id)?;
        let guard = rs.read().await;
        Some(guard.location.clone())
    }

    /// The slot grid for `date` with each slot's availability. Unknown locations
    /// produce an empty grid.
    pub async fn available_slots(&self, location_id: Ulid, date: NaiveDate) -> Vec<TimeSlot> {
        let Some(rs) = self.store.get_location(&location_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        classify_slots(&guard, date)
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let location_id = self.store.get_location_for_entity(&id)?;
        let rs = self.store.get_location(&location_id)?;
        let guard = rs.read().await;
        guard.bookings.get(&id).cloned()
    }

    /// Pending and confirmed bookings on `date`, ordered by start time.
    pub async fn bookings_for_date(&self, location_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        let Some(rs) = self.store.get_location(&location_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .day(date)
            .iter()
            .filter(|i| i.kind == IntervalKind::Booking)
            .filter_map(|i| guard.bookings.get(&i.id).cloned())
            .collect()
    }

    /// Blocked windows on `date`, ordered by start time.
    pub async fn blocks_for_date(&self, location_id: Ulid, date: NaiveDate) -> Vec<BlockedWindow> {
        let Some(rs) = self.store.get_location(&location_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .day(date)
            .iter()
            .filter(|i| i.kind == IntervalKind::Blocked)
            .filter_map(|i| guard.blocks.get(&i.id).cloned())
            .collect()
    }

    /// Confirmed bookings starting within the next `lookahead_minutes` of local time.
    pub async fn upcoming_bookings(&self, location_id: Ulid, lookahead_minutes: i64) -> Vec<Booking> {
        let now = Local::now().naive_local();
        self.upcoming_bookings_at(location_id, now, lookahead_minutes)
            .await
    }

    /// Confirmed bookings on `now`'s date with `now <= start_time <= now + lookahead`,
    /// ordered by start. The window never crosses midnight: it is clamped to the end
    /// of the current day.
    pub async fn upcoming_bookings_at(
        &self,
        location_id: Ulid,
        now: NaiveDateTime,
        lookahead_minutes: i64,
    ) -> Vec<Booking> {
        let Some(rs) = self.store.get_location(&location_id) else {
            return Vec::new();
        };
        let lookahead = lookahead_minutes.clamp(0, MAX_LOOKAHEAD_MINUTES);
        let date = now.date();
        let from = truncate_to_minute(now.time());
        let (to, wrapped) = from.overflowing_add_signed(TimeDelta::minutes(lookahead));
        let to = if wrapped != 0 {
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(from)
        } else {
            to
        };

        let guard = rs.read().await;
        let mut out: Vec<Booking> = guard
            .day(date)
            .iter()
            .filter(|i| i.kind == IntervalKind::Booking)
            .filter(|i| i.span.start >= from && i.span.start <= to)
            .filter_map(|i| guard.bookings.get(&i.id))
            .filter(|b| b.status == BookingStatus::Confirmed)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.start_time, b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_drops_seconds() {
        let t = NaiveTime::from_hms_milli_opt(9, 14, 59, 999).unwrap();
        assert_eq!(truncate_to_minute(t), NaiveTime::from_hms_opt(9, 14, 0).unwrap());
    }
}

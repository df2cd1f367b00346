use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedLocationState;

/// In-memory record store: one lock-guarded state per location, plus a reverse index
/// from booking/block ids to their location.
pub struct RecordStore {
    locations: DashMap<Ulid, SharedLocationState>,
    entity_to_location: DashMap<Ulid, Ulid>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            locations: DashMap::new(),
            entity_to_location: DashMap::new(),
        }
    }

    // ── Locations ────────────────────────────────────────────

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn get_location(&self, id: &Ulid) -> Option<SharedLocationState> {
        self.locations.get(id).map(|e| e.value().clone())
    }

    pub fn insert_location(&self, location: Location) {
        let id = location.id;
        self.locations
            .insert(id, Arc::new(RwLock::new(LocationState::new(location))));
    }

    pub fn location_states(&self) -> Vec<SharedLocationState> {
        self.locations.iter().map(|e| e.value().clone()).collect()
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn get_location_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_location.get(entity_id).map(|e| *e.value())
    }

    fn map_entity(&self, entity_id: Ulid, location_id: Ulid) {
        self.entity_to_location.insert(entity_id, location_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking/block event to a location (caller holds the write lock).
    /// `LocationCreated` is handled at the map level by `insert_location`.
    pub fn apply_event(&self, ls: &mut LocationState, event: &Event) {
        match event {
            Event::LocationCreated { .. } => {}
            Event::BookingCreated { booking } => {
                if booking.status.occupies() {
                    ls.insert_interval(
                        booking.booking_date,
                        Interval {
                            id: booking.id,
                            span: booking.span(),
                            kind: IntervalKind::Booking,
                        },
                    );
                }
                ls.bookings.insert(booking.id, booking.clone());
                self.map_entity(booking.id, booking.location_id);
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(booking) = ls.bookings.get_mut(id) {
                    if booking.status.occupies() {
                        let date = booking.booking_date;
                        booking.status = BookingStatus::Cancelled;
                        ls.remove_interval(date, *id);
                    }
                }
            }
            Event::BlockCreated { block } => {
                ls.insert_interval(
                    block.date,
                    Interval {
                        id: block.id,
                        span: block.span(),
                        kind: IntervalKind::Blocked,
                    },
                );
                ls.blocks.insert(block.id, block.clone());
                self.map_entity(block.id, block.location_id);
            }
        }
    }
}

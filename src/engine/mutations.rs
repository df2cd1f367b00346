use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{
    check_day_capacity, check_no_conflict, validate_block, validate_booking, validate_location,
};
use super::{wal_append, Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_location(&self, req: NewLocation) -> Result<Location, EngineError> {
        validate_location(&req)?;
        let catalog = self.catalog.clone().lock_owned().await;
        if self.store.location_count() >= MAX_LOCATIONS {
            return Err(EngineError::LimitExceeded("too many locations"));
        }

        let location = Location {
            id: Ulid::new(),
            name: req.name.trim().to_string(),
            address: req.address,
            city: req.city,
            state: req.state,
            zip: req.zip,
            hours_open: req.hours_open,
            hours_close: req.hours_close,
            num_tables: req.num_tables,
        };
        let event = Event::LocationCreated {
            location: location.clone(),
        };
        let store = self.store.clone();
        let wal_tx = self.wal_tx.clone();
        let notify = self.notify.clone();
        let created = location.clone();
        let commit = tokio::spawn(async move {
            let _catalog = catalog;
            wal_append(&wal_tx, &event).await?;
            store.insert_location(created);
            notify.send(event.location_id(), &event);
            Ok::<(), EngineError>(())
        });
        commit
            .await
            .map_err(|e| EngineError::StoreFailure(format!("commit task failed: {e}")))??;
        info!("created location {} ({})", location.id, location.name);
        Ok(location)
    }

    /// Create a booking. Validation, the overlap re-check and the insert all run under the
    /// location's write lock, so two requests for the same slot cannot both succeed.
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        let req = req.normalized();
        let span = validate_booking(&req)?;
        let rs = self
            .store
            .get_location(&req.location_id)
            .ok_or(EngineError::UnknownLocation(req.location_id))?;
        let guard = rs.write_owned().await;
        check_day_capacity(&guard, req.booking_date)?;

        if let Err(e) = check_no_conflict(&guard, req.booking_date, &span) {
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL).increment(1);
            debug!(
                "booking rejected at {} {} {}-{}: {e}",
                req.location_id, req.booking_date, span.start, span.end
            );
            return Err(e);
        }

        let status = if req.payment_id.is_some() {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        };
        let booking = Booking {
            id: Ulid::new(),
            location_id: req.location_id,
            booking_date: req.booking_date,
            start_time: span.start,
            end_time: span.end,
            customer_name: req.customer_name,
            customer_email: req.customer_email,
            customer_phone: req.customer_phone,
            party_size: req.party_size,
            status,
            payment_id: req.payment_id,
            created_at: Utc::now(),
        };

        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(guard, event).await?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL, "status" => status.as_str())
            .increment(1);
        info!(
            "booking {} {} at {} {} {}-{}",
            booking.id, status, booking.location_id, booking.booking_date, span.start, span.end
        );
        Ok(booking)
    }

    /// Mark a booking cancelled. `Ok(true)` when the booking exists, whether or not it
    /// was already cancelled; `Ok(false)` for unknown ids.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<bool, EngineError> {
        let Some(location_id) = self.store.get_location_for_entity(&id) else {
            return Ok(false);
        };
        let Some(rs) = self.store.get_location(&location_id) else {
            return Ok(false);
        };
        let guard = rs.write_owned().await;
        match guard.bookings.get(&id).map(|b| b.status) {
            None => Ok(false),
            Some(BookingStatus::Cancelled) => Ok(true),
            Some(_) => {
                let event = Event::BookingCancelled { id, location_id };
                self.persist_and_apply(guard, event).await?;
                info!("booking {id} cancelled");
                Ok(true)
            }
        }
    }

    /// Close a window for new bookings. Overlapping blocks are allowed and existing
    /// bookings inside the window are left as they are.
    pub async fn create_block(&self, req: NewBlock) -> Result<BlockedWindow, EngineError> {
        let span = validate_block(&req)?;
        let rs = self
            .store
            .get_location(&req.location_id)
            .ok_or(EngineError::UnknownLocation(req.location_id))?;
        let guard = rs.write_owned().await;
        check_day_capacity(&guard, req.date)?;

        let block = BlockedWindow {
            id: Ulid::new(),
            location_id: req.location_id,
            date: req.date,
            start_time: span.start,
            end_time: span.end,
            reason: req.reason,
            created_by: req.created_by,
            created_at: Utc::now(),
        };
        let event = Event::BlockCreated {
            block: block.clone(),
        };
        self.persist_and_apply(guard, event).await?;
        info!(
            "blocked {} {} {}-{} ({})",
            block.location_id,
            block.date,
            span.start,
            span.end,
            block.reason.label()
        );
        Ok(block)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    /// Cancelled bookings are kept, carrying their final status.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let mut states = Vec::new();
        for rs in self.store.location_states() {
            states.push(rs.read_owned().await);
        }
        states.sort_by_key(|ls| ls.location.id);

        let mut events = Vec::new();
        for ls in &states {
            events.push(Event::LocationCreated {
                location: ls.location.clone(),
            });
            let mut bookings: Vec<_> = ls.bookings.values().collect();
            bookings.sort_by_key(|b| b.id);
            events.extend(bookings.into_iter().map(|b| Event::BookingCreated {
                booking: b.clone(),
            }));
            let mut blocks: Vec<_> = ls.blocks.values().collect();
            blocks.sort_by_key(|b| b.id);
            events.extend(blocks.into_iter().map(|b| Event::BlockCreated { block: b.clone() }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StoreFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreFailure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
        // Read guards are held until the swap lands, so no append can slip in between.
        drop(states);
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

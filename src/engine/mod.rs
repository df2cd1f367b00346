mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{classify_slots, slot_available, slot_grid, SlotGrid};
pub use error::{EngineError, FieldError};
pub use store::RecordStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedLocationState = Arc<RwLock<LocationState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Every append that is already queued when the first one arrives joins the same
/// fsync; a non-append command closes the batch and runs after it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut trailing = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    trailing = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = trailing {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    wal.append_batch(batch.iter().map(|(event, _)| event))
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The availability and conflict engine. One instance per data file; callers share it
/// through an `Arc`.
pub struct Engine {
    pub(super) store: Arc<RecordStore>,
    /// Serializes location creation against compaction's snapshot.
    pub(super) catalog: Arc<Mutex<()>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must run inside a tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = RecordStore::new();
        // Replay is single-owner, so try_write never contends. Never block here: this
        // may run inside an async context.
        for event in &events {
            match event {
                Event::LocationCreated { location } => store.insert_location(location.clone()),
                other => {
                    let Some(rs) = store.get_location(&other.location_id()) else {
                        continue;
                    };
                    let mut guard = rs
                        .try_write()
                        .map_err(|_| io::Error::other("replay: location state contended"))?;
                    if let Err(e) = replay_conflict(&guard, other) {
                        warn!("replay: skipping {other:?}: {e}");
                        continue;
                    }
                    store.apply_event(&mut guard, other);
                }
            }
        }
        debug!(
            "replayed {} events into {} locations",
            events.len(),
            store.location_count()
        );

        Ok(Self {
            store: Arc::new(store),
            catalog: Arc::new(Mutex::new(())),
            wal_tx,
            notify,
        })
    }

    pub fn location_state(&self, id: &ulid::Ulid) -> Option<SharedLocationState> {
        self.store.get_location(id)
    }

    /// WAL-append, then apply, then notify. State is untouched if the append fails.
    ///
    /// Runs on its own task holding the location's write guard, so a caller that gives
    /// up mid-commit cannot leave an event durable but unapplied.
    pub(super) async fn persist_and_apply(
        &self,
        mut guard: OwnedRwLockWriteGuard<LocationState>,
        event: Event,
    ) -> Result<(), EngineError> {
        let store = self.store.clone();
        let wal_tx = self.wal_tx.clone();
        let notify = self.notify.clone();
        let commit = tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            store.apply_event(&mut guard, &event);
            notify.send(event.location_id(), &event);
            Ok::<(), EngineError>(())
        });
        commit
            .await
            .map_err(|e| EngineError::StoreFailure(format!("commit task failed: {e}")))?
    }
}

/// Write event to WAL via the background group-commit writer.
pub(super) async fn wal_append(
    wal_tx: &mpsc::Sender<WalCommand>,
    event: &Event,
) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::StoreFailure("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::StoreFailure("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

/// A logged booking that overlaps an active entry can only come from a damaged log;
/// replay refuses it rather than resurrect a double booking.
fn replay_conflict(ls: &LocationState, event: &Event) -> Result<(), EngineError> {
    match event {
        Event::BookingCreated { booking } if booking.status.occupies() => {
            conflict::check_no_conflict(ls, booking.booking_date, &booking.span())
        }
        _ => Ok(()),
    }
}

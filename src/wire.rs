use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError, FieldError};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};

/// Prefix of every LISTEN channel; the rest is the location id.
pub const CHANNEL_PREFIX: &str = "location_";

/// Outbound notifications buffered per connection before listeners wait.
const NOTIFY_QUEUE: usize = 256;

/// A failed statement, ready to render as an error reply.
#[derive(Debug)]
pub struct ReplyError {
    kind: &'static str,
    message: String,
    fields: Vec<FieldError>,
}

impl ReplyError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

impl From<EngineError> for ReplyError {
    fn from(e: EngineError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
            fields: e.fields().to_vec(),
        }
    }
}

impl From<SqlError> for ReplyError {
    fn from(e: SqlError) -> Self {
        let message = e.to_string();
        match e {
            SqlError::InvalidValue { column, message: detail } => Self {
                kind: "validation",
                message,
                fields: vec![FieldError::new(column, detail)],
            },
            SqlError::MissingColumn { column, .. } => Self {
                kind: "validation",
                message,
                fields: vec![FieldError::new(column, "is required")],
            },
            _ => Self::new("syntax", message),
        }
    }
}

pub fn ok_rows(rows: Vec<Value>) -> Value {
    json!({ "status": "ok", "rows": rows })
}

pub fn ok_affected(n: usize) -> Value {
    json!({ "status": "ok", "affected": n })
}

pub fn error_reply(err: &ReplyError) -> Value {
    json!({
        "status": "error",
        "kind": err.kind,
        "message": err.message,
        "fields": err.fields,
    })
}

fn to_rows<T: Serialize>(items: impl IntoIterator<Item = T>) -> Result<Vec<Value>, ReplyError> {
    items
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()
        .map_err(|e| ReplyError::new("store_failure", format!("encode row: {e}")))
}

/// Blocked windows render their reason as a code plus an optional note.
fn block_row(block: &BlockedWindow) -> Value {
    json!({
        "id": block.id,
        "location_id": block.location_id,
        "date": block.date,
        "start_time": format_wall_clock(&block.start_time),
        "end_time": format_wall_clock(&block.end_time),
        "reason": block.reason.code(),
        "note": block.reason.note(),
        "created_by": block.created_by,
        "created_at": block.created_at,
    })
}

fn parse_channel(channel: &str) -> Result<Ulid, ReplyError> {
    let id = channel.strip_prefix(CHANNEL_PREFIX).ok_or_else(|| {
        ReplyError::new(
            "syntax",
            format!("invalid channel: {channel} (expected {CHANNEL_PREFIX}<id>)"),
        )
    })?;
    Ulid::from_string(id)
        .map_err(|e| ReplyError::new("syntax", format!("bad ULID in channel: {e}")))
}

/// Forward one location's events to the connection until the hub drops or the
/// connection goes away.
async fn forward_notifications(
    channel: String,
    mut rx: broadcast::Receiver<Event>,
    out: mpsc::Sender<String>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("listener on {channel} lagged, {skipped} notifications dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let msg = json!({ "status": "notify", "channel": channel, "event": event });
        if out.send(msg.to_string()).await.is_err() {
            break;
        }
    }
}

/// Per-connection state: the engine plus active LISTEN forwarders.
pub struct Session {
    engine: Arc<Engine>,
    listeners: HashMap<String, JoinHandle<()>>,
    notify_tx: mpsc::Sender<String>,
}

impl Session {
    pub fn new(engine: Arc<Engine>, notify_tx: mpsc::Sender<String>) -> Self {
        Self {
            engine,
            listeners: HashMap::new(),
            notify_tx,
        }
    }

    /// Parse and run one line, returning the JSON reply.
    pub async fn handle_line(&mut self, line: &str) -> Value {
        let started = Instant::now();
        let cmd = match sql::parse_sql(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!("rejected statement {line:?}: {e}");
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "invalid", "status" => "error")
                    .increment(1);
                return error_reply(&ReplyError::from(e));
            }
        };

        let label = observability::command_label(&cmd);
        let result = self.execute(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(reply) => reply,
            Err(e) => {
                debug!("{label} failed: {} ({})", e.message, e.kind);
                error_reply(&e)
            }
        }
    }

    async fn execute(&mut self, cmd: Command) -> Result<Value, ReplyError> {
        let engine = &self.engine;
        match cmd {
            Command::SelectLocations { id: None } => {
                Ok(ok_rows(to_rows(engine.list_locations().await)?))
            }
            Command::SelectLocations { id: Some(id) } => {
                Ok(ok_rows(to_rows(engine.get_location(id).await)?))
            }
            Command::InsertLocation(req) => {
                let location = engine.create_location(req).await?;
                Ok(ok_rows(to_rows([location])?))
            }
            Command::SelectSlots { location_id, date } => {
                Ok(ok_rows(to_rows(engine.available_slots(location_id, date).await)?))
            }
            Command::InsertBooking(req) => {
                let booking = engine.create_booking(req).await?;
                Ok(ok_rows(to_rows([booking])?))
            }
            Command::SelectBooking { id } => Ok(ok_rows(to_rows(engine.get_booking(id).await)?)),
            Command::SelectBookings { location_id, date } => Ok(ok_rows(to_rows(
                engine.bookings_for_date(location_id, date).await,
            )?)),
            Command::SelectUpcoming {
                location_id,
                lookahead_minutes,
            } => Ok(ok_rows(to_rows(
                engine
                    .upcoming_bookings(location_id, lookahead_minutes)
                    .await,
            )?)),
            Command::CancelBooking { id } => {
                let found = engine.cancel_booking(id).await?;
                Ok(ok_affected(usize::from(found)))
            }
            Command::InsertBlock(req) => {
                let block = engine.create_block(req).await?;
                Ok(ok_rows(vec![block_row(&block)]))
            }
            Command::SelectBlocks { location_id, date } => Ok(ok_rows(
                engine
                    .blocks_for_date(location_id, date)
                    .await
                    .iter()
                    .map(block_row)
                    .collect(),
            )),
            Command::Listen { channel } => self.listen(channel),
            Command::Unlisten { channel } => {
                parse_channel(&channel)?;
                let removed = self.listeners.remove(&channel);
                if let Some(handle) = &removed {
                    handle.abort();
                }
                Ok(ok_affected(usize::from(removed.is_some())))
            }
            Command::UnlistenAll => Ok(ok_affected(self.unlisten_all())),
        }
    }

    fn listen(&mut self, channel: String) -> Result<Value, ReplyError> {
        let location_id = parse_channel(&channel)?;
        if self.listeners.contains_key(&channel) {
            return Ok(ok_affected(0));
        }
        if self.listeners.len() >= MAX_LISTENS_PER_CONNECTION {
            return Err(EngineError::LimitExceeded("too many LISTEN channels").into());
        }
        let rx = self.engine.notify.subscribe(location_id);
        let handle = tokio::spawn(forward_notifications(
            channel.clone(),
            rx,
            self.notify_tx.clone(),
        ));
        self.listeners.insert(channel, handle);
        Ok(ok_affected(1))
    }

    /// Stop every forwarder; returns how many were active.
    pub fn unlisten_all(&mut self) -> usize {
        let count = self.listeners.len();
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
        count
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unlisten_all();
    }
}

fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Serve one client: newline-delimited statements in, one JSON reply per line out,
/// with notifications interleaved between replies.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (notify_tx, mut notify_rx) = mpsc::channel::<String>(NOTIFY_QUEUE);
    let mut session = Session::new(engine, notify_tx);

    loop {
        tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        let err = ReplyError::new("syntax", format!("line exceeds {MAX_LINE_LEN} bytes"));
                        framed.send(error_reply(&err).to_string()).await.map_err(codec_err)?;
                        continue;
                    }
                    Some(Err(e)) => return Err(codec_err(e)),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = session.handle_line(&line).await;
                framed.send(reply.to_string()).await.map_err(codec_err)?;
            }
            Some(msg) = notify_rx.recv() => {
                framed.send(msg).await.map_err(codec_err)?;
            }
        }
    }
    Ok(())
}

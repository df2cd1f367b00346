use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Largest payload replay will allocate for. Anything bigger is a corrupt length prefix.
const MAX_ENTRY_LEN: usize = 1 << 20;

/// Length prefix plus checksum around each payload.
const FRAME_OVERHEAD: u64 = 8;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Outcome of reading one frame during replay.
enum Frame {
    /// A complete entry and its size on disk.
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Partial or corrupt tail; everything from here on is discarded.
    Torn(&'static str),
}

/// `read_exact` that reports a short read as `Ok(false)`.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    match reader.read(&mut len_buf[..1])? {
        0 => return Ok(Frame::End),
        _ => {
            if !fill(reader, &mut len_buf[1..])? {
                return Ok(Frame::Torn("truncated length prefix"));
            }
        }
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_ENTRY_LEN {
        return Ok(Frame::Torn("implausible entry length"));
    }

    let mut payload = vec![0u8; len];
    if !fill(reader, &mut payload)? {
        return Ok(Frame::Torn("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !fill(reader, &mut crc_buf)? {
        return Ok(Frame::Torn("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Frame::Event(event, len as u64 + FRAME_OVERHEAD)),
        Err(_) => Ok(Frame::Torn("undecodable payload")),
    }
}

/// Every complete entry in `reader`, the byte length they cover, and why reading
/// stopped early if it did.
fn scan(reader: &mut impl Read) -> io::Result<(Vec<Event>, u64, Option<&'static str>)> {
    let mut events = Vec::new();
    let mut valid_len = 0;
    loop {
        match read_frame(reader)? {
            Frame::Event(event, size) => {
                events.push(event);
                valid_len += size;
            }
            Frame::End => return Ok((events, valid_len, None)),
            Frame::Torn(why) => return Ok((events, valid_len, Some(why))),
        }
    }
}

/// Storage under the log: appendable, durable on `sync`, and able to cut back to a
/// committed length.
pub trait LogFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

/// Append-only write-ahead log of booking events.
///
/// Appends land in batches: a batch is either fully synced or cut back off the file.
/// A crash can still leave a torn final entry; `open` trims it and replay ignores it.
pub struct Wal<F: LogFile = File> {
    file: F,
    path: PathBuf,
    /// Length of the synced, acknowledged prefix of the file.
    committed_len: u64,
    /// Set when a rollback itself failed; the file tail is then unknown.
    poisoned: bool,
    appends_since_compact: u64,
}

impl Wal<File> {
    /// Open `path` for appending, trimming any torn tail left by a crash.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let on_disk = file.metadata()?.len();
        let (_, valid_len, torn) = scan(&mut BufReader::new(&file))?;
        if valid_len < on_disk {
            warn!(
                "WAL {}: trimming {} bytes of torn tail ({})",
                path.display(),
                on_disk - valid_len,
                torn.unwrap_or("trailing bytes")
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            committed_len: valid_len,
            poisoned: false,
            appends_since_compact: 0,
        })
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.compact")
    }

    /// Write the compacted event set next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the log and reopen it for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.file = file;
        self.poisoned = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every complete event from `path`. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let (events, _, torn) = scan(&mut BufReader::new(file))?;
        if let Some(why) = torn {
            warn!(
                "WAL {}: discarding tail after {} events ({why})",
                path.display(),
                events.len()
            );
        }
        Ok(events)
    }
}

impl<F: LogFile> Wal<F> {
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_batch([event])
    }

    /// Append `events` as one durable unit. On any failure the file is cut back to its
    /// length before the batch, so no entry of a failed batch can come back on replay.
    pub fn append_batch<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("WAL unusable after a failed rollback"));
        }
        let mut buf = Vec::new();
        let mut count = 0;
        for event in events {
            encode_event(&mut buf, event)?;
            count += 1;
        }
        if buf.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.write_synced(&buf) {
            if let Err(rollback) = self.file.truncate(self.committed_len) {
                error!(
                    "WAL {}: rollback to {} bytes failed: {rollback}",
                    self.path.display(),
                    self.committed_len
                );
                self.poisoned = true;
            }
            return Err(e);
        }
        self.committed_len += buf.len() as u64;
        self.appends_since_compact += count;
        Ok(())
    }

    fn write_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.flush()?;
        self.file.sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Append-only log of bincode entries with length and CRC framing.
///
/// On-disk format per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode)]
/// ```
///
/// Entries that fail the CRC check are skipped on recovery. A truncated
/// tail (torn write) ends recovery.
pub struct FramedLog<T> {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> FramedLog<T> {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            _entry: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and fsync a single entry.
    pub fn append(&self, entry: &T) -> LedgerResult<()> {
        let frame = encode_frame(entry)?;
        let mut w = self.writer.lock().expect("lock poisoned");
        w.write_all(&frame)?;
        w.flush()?;
        w.get_ref().sync_data()?;
        Ok(())
    }

    /// Read every intact entry from the start of the file.
    pub fn recover(&self) -> LedgerResult<Vec<T>> {
        // Hold the writer lock so no frame is half-written while we read.
        let _w = self.writer.lock().expect("lock poisoned");
        read_frames(&self.path)
    }

    /// Atomically replace the log contents with `entries`.
    pub fn rewrite(&self, entries: &[T]) -> LedgerResult<()> {
        let mut w = self.writer.lock().expect("lock poisoned");
        w.flush()?;

        let tmp = self.path.with_extension("compact");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for entry in entries {
                out.write_all(&encode_frame(entry)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        *w = BufWriter::new(file);
        debug!(path = %self.path.display(), entries = entries.len(), "log rewritten");
        Ok(())
    }
}

fn encode_frame<T: Serialize>(entry: &T) -> LedgerResult<Vec<u8>> {
    let payload = bincode::serialize(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn read_frames<T: DeserializeOwned>(path: &Path) -> LedgerResult<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut header = [0u8; HEADER_SIZE];

    loop {
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(path = %path.display(), "truncated log tail ignored");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        if crc32fast::hash(&payload) != crc {
            warn!(path = %path.display(), "log entry failed CRC check, skipping");
            continue;
        }
        match bincode::deserialize(&payload) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), error = %e, "undecodable log entry, skipping"),
        }
    }
    Ok(entries)
}

//! # File Log Transport
//!
//! Append-only file with per-record integrity checks. Recovered on open:
//! every valid record is loaded, and a torn or corrupt tail is cut off so
//! later appends continue from the last good record.
//!
//! Group acknowledgements go to a sidecar file (`<log>.acks`) with the same
//! framing, so a reopened log keeps every group's progress.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "TFHL" (log) or "TFHA" (acks)]
//! [4 bytes: format version]
//!
//! Frame format:
//! [8 bytes: offset]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of the above]
//! ```
//!
//! A log frame carries its own offset and the fact batch. An ack frame
//! carries the acknowledged offset and the group name.

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{slice_records, LogTransport, Offset};
use crate::error::{FirehoseError, FirehoseResult};

/// Magic bytes identifying a firehose log file.
const LOG_MAGIC: &[u8; 4] = b"TFHL";

/// Magic bytes identifying a group ack file.
const ACK_MAGIC: &[u8; 4] = b"TFHA";

/// Current format version of both files.
const LOG_VERSION: u32 = 1;

const HEADER_LEN: u64 = 8;

struct LogFile {
    file: File,
    /// Records loaded at open plus everything appended since.
    records: Vec<Vec<u8>>,
}

struct AckFile {
    file: File,
    /// Acknowledged offsets per group.
    groups: HashMap<String, BTreeSet<Offset>>,
}

/// File-backed log transport.
pub struct FileTransport {
    path: PathBuf,
    acks_path: PathBuf,
    inner: Mutex<LogFile>,
    acks: Mutex<AckFile>,
}

fn encode_frame(offset: Offset, payload: &[u8]) -> FirehoseResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| FirehoseError::Corrupt {
        offset,
        reason: format!("record of {} bytes exceeds u32 length", payload.len()),
    })?;
    let mut buf = Vec::with_capacity(8 + 4 + payload.len() + 4);
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Reads one frame. `Ok(None)` at a clean end of file. `index` is the
/// frame's position in the file, used for error reporting.
fn read_frame(reader: &mut impl Read, index: u64) -> FirehoseResult<Option<(Offset, Vec<u8>)>> {
    let mut offset_bytes = [0u8; 8];
    match reader.read_exact(&mut offset_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let corrupt = |reason: &str| FirehoseError::Corrupt {
        offset: index,
        reason: reason.to_string(),
    };

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).map_err(|_| corrupt("truncated length"))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|_| corrupt("truncated payload"))?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes).map_err(|_| corrupt("truncated checksum"))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&offset_bytes);
    hasher.update(&len_bytes);
    hasher.update(&payload);
    if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
        return Err(corrupt("CRC mismatch"));
    }
    Ok(Some((u64::from_le_bytes(offset_bytes), payload)))
}

/// Opens or creates a framed file and loads its good frames.
///
/// Reading stops at the first frame that fails its check or that `accept`
/// refuses; the file is truncated there and positioned for appends.
fn open_framed(
    path: &Path,
    magic: &[u8; 4],
    mut accept: impl FnMut(u64, Offset) -> bool,
) -> FirehoseResult<(File, Vec<(Offset, Vec<u8>)>)> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;

    if file.metadata()?.len() == 0 {
        file.write_all(magic)?;
        file.write_all(&LOG_VERSION.to_le_bytes())?;
        file.sync_all()?;
    }

    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut file);

    let mut found = [0u8; 4];
    reader
        .read_exact(&mut found)
        .map_err(|e| FirehoseError::InvalidHeader(format!("failed to read magic: {e}")))?;
    if &found != magic {
        return Err(FirehoseError::InvalidHeader("bad magic".into()));
    }
    let mut version = [0u8; 4];
    reader
        .read_exact(&mut version)
        .map_err(|e| FirehoseError::InvalidHeader(format!("failed to read version: {e}")))?;
    let version = u32::from_le_bytes(version);
    if version != LOG_VERSION {
        return Err(FirehoseError::InvalidHeader(format!("unsupported version {version}")));
    }

    let mut frames = Vec::new();
    let mut good_len = HEADER_LEN;
    loop {
        let index = frames.len() as u64;
        match read_frame(&mut reader, index) {
            Ok(Some((offset, payload))) => {
                if !accept(index, offset) {
                    warn!(path = %path.display(), index, offset, "truncating out-of-sequence frame");
                    break;
                }
                good_len += 8 + 4 + payload.len() as u64 + 4;
                frames.push((offset, payload));
            }
            Ok(None) => break,
            Err(FirehoseError::Corrupt { offset, reason }) => {
                warn!(path = %path.display(), offset, %reason, "truncating corrupt tail");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    drop(reader);

    file.set_len(good_len)?;
    file.seek(SeekFrom::End(0))?;
    Ok((file, frames))
}

impl FileTransport {
    /// Opens or creates a log file and its ack sidecar, recovering both.
    pub fn open(path: impl AsRef<Path>) -> FirehoseResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, frames) = open_framed(&path, LOG_MAGIC, |index, offset| index == offset)?;
        let records: Vec<Vec<u8>> = frames.into_iter().map(|(_, payload)| payload).collect();

        let mut name = OsString::from(path.as_os_str());
        name.push(".acks");
        let acks_path = PathBuf::from(name);
        let (ack_file, frames) = open_framed(&acks_path, ACK_MAGIC, |_, _| true)?;
        let mut groups: HashMap<String, BTreeSet<Offset>> = HashMap::new();
        for (offset, group) in frames {
            match String::from_utf8(group) {
                Ok(group) => {
                    groups.entry(group).or_default().insert(offset);
                }
                Err(_) => warn!(offset, "skipping ack with a non-UTF-8 group name"),
            }
        }

        info!(
            path = %path.display(),
            records = records.len(),
            groups = groups.len(),
            "firehose log opened"
        );

        Ok(Self {
            path,
            acks_path,
            inner: Mutex::new(LogFile { file, records }),
            acks: Mutex::new(AckFile {
                file: ack_file,
                groups,
            }),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the group ack sidecar.
    #[must_use]
    pub fn acks_path(&self) -> &Path {
        &self.acks_path
    }
}

#[async_trait]
impl LogTransport for FileTransport {
    async fn append(&self, record: Vec<u8>) -> FirehoseResult<Offset> {
        let mut log = self.inner.lock();
        let offset = log.records.len() as Offset;
        let bytes = encode_frame(offset, &record)?;
        log.file.write_all(&bytes)?;
        log.file.sync_data()?;
        log.records.push(record);
        Ok(offset)
    }

    async fn read(&self, from: Offset, max: usize) -> FirehoseResult<Vec<(Offset, Vec<u8>)>> {
        Ok(slice_records(&self.inner.lock().records, from, max))
    }

    async fn head(&self) -> FirehoseResult<Offset> {
        Ok(self.inner.lock().records.len() as Offset)
    }

    async fn record_ack(&self, group: &str, offset: Offset) -> FirehoseResult<()> {
        let mut acks = self.acks.lock();
        if acks.groups.get(group).is_some_and(|set| set.contains(&offset)) {
            return Ok(());
        }
        let bytes = encode_frame(offset, group.as_bytes())?;
        acks.file.write_all(&bytes)?;
        acks.file.sync_data()?;
        acks.groups.entry(group.to_string()).or_default().insert(offset);
        Ok(())
    }

    async fn acked(&self, group: &str) -> FirehoseResult<Vec<Offset>> {
        Ok(self
            .acks
            .lock()
            .groups
            .get(group)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

//! Append-only ledger log
//!
//! Records are framed as `len (u32 LE) | bincode payload` and flushed with
//! `sync_data` before `append` returns.

use crate::LedgerError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Largest record the replay will accept; anything bigger is corruption.
const MAX_RECORD_LEN: u32 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    Insert {
        scope_id: String,
        logical_id: String,
        materialized_id: String,
        /// Unix timestamp, milliseconds
        recorded_at_ms: i64,
    },
    DeleteScope {
        scope_id: String,
    },
    DeleteEntry {
        scope_id: String,
        logical_id: String,
    },
}

pub(crate) struct LedgerLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl LedgerLog {
    pub(crate) fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record; durable once this returns.
    ///
    /// A failed write is rolled back so the next append starts on a frame
    /// boundary.
    pub(crate) fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let data = bincode::serialize(record)?;
        let len = data.len() as u32;

        let mut frame = Vec::with_capacity(data.len() + 4);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);

        let mut file = self.file.lock();
        let start = file.metadata()?.len();
        let written = file.write_all(&frame).and_then(|()| file.sync_data());
        rollback_on_error(&file, start, written)
    }

    /// Replay every complete record in order.
    ///
    /// Only the last frame may be incomplete (crash between length and
    /// payload): it is cut off and the file truncated to the last complete
    /// record. A frame that claims to run past the end of the file while a
    /// complete record still follows it is a damaged length, not a torn
    /// write, and is reported as corruption like any other bad record.
    pub(crate) fn replay<F>(&self, mut handler: F) -> Result<usize, LedgerError>
    where
        F: FnMut(LedgerRecord),
    {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut offset = 0;
        let mut replayed = 0;
        let mut torn_at = None;

        while offset < bytes.len() {
            match read_frame(&bytes, offset) {
                Frame::Record { record, end } => {
                    handler(record);
                    offset = end;
                    replayed += 1;
                }
                Frame::Partial if !complete_frame_after(&bytes, offset + 1) => {
                    torn_at = Some(offset);
                    break;
                }
                Frame::Partial => {
                    return Err(LedgerError::Corrupt {
                        offset: offset as u64,
                        reason: "record length runs past later records".to_string(),
                    });
                }
                Frame::Oversized(len) => {
                    return Err(LedgerError::Corrupt {
                        offset: offset as u64,
                        reason: format!("record length {len} exceeds limit"),
                    });
                }
                Frame::Undecodable { end, reason } if end == bytes.len() => {
                    tracing::warn!(offset, error = %reason, "discarding undecodable tail record");
                    torn_at = Some(offset);
                    break;
                }
                Frame::Undecodable { reason, .. } => {
                    return Err(LedgerError::Corrupt {
                        offset: offset as u64,
                        reason,
                    });
                }
            }
        }

        if let Some(offset) = torn_at {
            tracing::warn!(
                path = %self.path.display(),
                offset,
                discarded = bytes.len() - offset,
                "truncating torn ledger tail"
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(replayed)
    }

    /// Replace the log contents with `records`, atomically.
    pub(crate) fn rewrite(&self, records: &[LedgerRecord]) -> Result<(), LedgerError> {
        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            for record in records {
                let data = bincode::serialize(record)?;
                tmp.write_all(&(data.len() as u32).to_le_bytes())?;
                tmp.write_all(&data)?;
            }
            tmp.sync_all()?;
        }

        let mut file = self.file.lock();
        std::fs::rename(&tmp_path, &self.path)?;
        *file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }
}

enum Frame {
    Record { record: LedgerRecord, end: usize },
    /// Length prefix or payload cut short by the end of the file
    Partial,
    Oversized(u32),
    Undecodable { end: usize, reason: String },
}

fn read_frame(bytes: &[u8], offset: usize) -> Frame {
    let Some(len_bytes) = bytes.get(offset..offset + 4) else {
        return Frame::Partial;
    };
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(len_bytes);
    let len = u32::from_le_bytes(prefix);
    if len > MAX_RECORD_LEN {
        return Frame::Oversized(len);
    }

    let end = offset + 4 + len as usize;
    let Some(payload) = bytes.get(offset + 4..end) else {
        return Frame::Partial;
    };
    match bincode::deserialize::<LedgerRecord>(payload) {
        Ok(record) => Frame::Record { record, end },
        Err(err) => Frame::Undecodable {
            end,
            reason: err.to_string(),
        },
    }
}

/// Whether a complete, decodable record starts anywhere at or after `from`.
fn complete_frame_after(bytes: &[u8], from: usize) -> bool {
    (from..bytes.len()).any(|offset| matches!(read_frame(bytes, offset), Frame::Record { .. }))
}

/// Cut the file back to `start` when a write failed halfway.
fn rollback_on_error(
    file: &File,
    start: u64,
    written: std::io::Result<()>,
) -> Result<(), LedgerError> {
    let Err(err) = written else {
        return Ok(());
    };
    if let Err(truncate_err) = file.set_len(start) {
        tracing::error!(
            start,
            error = %truncate_err,
            "could not roll back a partial ledger write"
        );
    }
    Err(err.into())
}

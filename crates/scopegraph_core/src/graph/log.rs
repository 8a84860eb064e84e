//! Commit log records and replay.
//!
//! Every record is wrapped in the same envelope:
//!
//! ```text
//! | magic "SGLG" (4) | version (2) | type (1) | payload len (4) | payload | crc32 (4) |
//! ```
//!
//! Integers are little-endian; the checksum covers everything before it.
//! A `Commit` payload is `seq (8) | op count (4)` followed by, per op,
//! `key len (4) | key | flag (1) | [value len (4) | value]` where flag `1`
//! carries a value and `0` is a deletion. A `Marker` payload is one byte.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use bytes::Bytes;

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"SGLG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 11;
const TRAILER_SIZE: usize = 4;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// An atomic batch of key mutations.
    Commit = 1,
    /// The dirty/valid marker.
    Marker = 2,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Marker),
            _ => None,
        }
    }
}

/// One key mutation of a commit; `None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Affected key.
    pub key: Vec<u8>,
    /// New value, or `None` for a deletion.
    pub value: Option<Bytes>,
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Mutations applied atomically at `seq`.
    Commit {
        /// Sequence number assigned to the commit.
        seq: SequenceNumber,
        /// Mutations in key order.
        mutations: Vec<Mutation>,
    },
    /// Dirty/valid marker transition.
    Marker {
        /// Whether the index may be out of sync with the store.
        dirty: bool,
    },
}

impl LogRecord {
    /// The record's type byte.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Marker { .. } => LogRecordType::Marker,
        }
    }

    /// Encodes the record with its envelope.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Commit { seq, mutations } => encode_commit(*seq, mutations),
            Self::Marker { dirty } => envelope(LogRecordType::Marker, &[u8::from(*dirty)]),
        }
    }

    fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> Result<Self, String> {
        let mut reader = PayloadReader::new(payload);
        let record = match record_type {
            LogRecordType::Commit => {
                let seq = SequenceNumber::new(reader.u64()?);
                let count = reader.u32()? as usize;
                let mut mutations = Vec::with_capacity(count.min(payload.len()));
                for _ in 0..count {
                    let key_len = reader.u32()? as usize;
                    let key = reader.bytes(key_len)?.to_vec();
                    let value = match reader.u8()? {
                        0 => None,
                        1 => {
                            let len = reader.u32()? as usize;
                            Some(Bytes::copy_from_slice(reader.bytes(len)?))
                        }
                        other => return Err(format!("unknown mutation flag {other}")),
                    };
                    mutations.push(Mutation { key, value });
                }
                Self::Commit { seq, mutations }
            }
            LogRecordType::Marker => match reader.u8()? {
                0 => Self::Marker { dirty: false },
                1 => Self::Marker { dirty: true },
                other => return Err(format!("unknown marker state {other}")),
            },
        };
        if !reader.is_exhausted() {
            return Err("trailing payload bytes".to_string());
        }
        Ok(record)
    }
}

/// Encodes a commit record without building a [`LogRecord`].
#[must_use]
pub fn encode_commit(seq: SequenceNumber, mutations: &[Mutation]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&seq.as_u64().to_le_bytes());
    buf.extend_from_slice(&(mutations.len() as u32).to_le_bytes());
    for mutation in mutations {
        buf.extend_from_slice(&(mutation.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&mutation.key);
        match &mutation.value {
            Some(value) => {
                buf.push(1);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
            }
            None => buf.push(0),
        }
    }
    envelope(LogRecordType::Commit, &buf)
}

fn envelope(record_type: LogRecordType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    out.extend_from_slice(&LOG_MAGIC);
    out.extend_from_slice(&LOG_VERSION.to_le_bytes());
    out.push(record_type as u8);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| "payload truncated".to_string())?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, String> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, String> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Outcome of scanning a log buffer.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in log order, with their starting offsets.
    pub records: Vec<(u64, LogRecord)>,
    /// Length of the valid prefix; bytes beyond it are a torn tail.
    pub valid_len: u64,
}

/// Scans a whole log buffer.
///
/// A final record that is cut short, or whose checksum fails while it is
/// the last bytes of the log, is a torn write and ends the scan. Any other
/// malformed record is [`CoreError::LogCorruption`].
///
/// # Errors
///
/// Returns [`CoreError::LogCorruption`] for bad magic, unknown versions or
/// types, mid-log checksum failures and undecodable payloads.
pub fn replay(data: &[u8]) -> CoreResult<Replay> {
    let mut replay = Replay::default();
    let mut offset = 0usize;

    while offset < data.len() {
        let at = offset as u64;
        let remaining = &data[offset..];
        if remaining.len() < HEADER_SIZE {
            break;
        }
        if remaining[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(at, "bad magic"));
        }
        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version != LOG_VERSION {
            return Err(CoreError::log_corruption(
                at,
                format!("unsupported version {version}"),
            ));
        }
        let record_type = LogRecordType::from_byte(remaining[6]).ok_or_else(|| {
            CoreError::log_corruption(at, format!("unknown record type {}", remaining[6]))
        })?;
        let len = u32::from_le_bytes([remaining[7], remaining[8], remaining[9], remaining[10]])
            as usize;
        let total = HEADER_SIZE + len + TRAILER_SIZE;
        if remaining.len() < total {
            break;
        }

        let body = &remaining[..HEADER_SIZE + len];
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&remaining[HEADER_SIZE + len..total]);
        if crc32fast::hash(body) != u32::from_le_bytes(stored) {
            if remaining.len() == total {
                break;
            }
            return Err(CoreError::log_corruption(at, "checksum mismatch"));
        }

        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])
            .map_err(|message| CoreError::log_corruption(at, message))?;
        replay.records.push((at, record));
        offset += total;
        replay.valid_len = offset as u64;
    }

    Ok(replay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(seq: u64) -> LogRecord {
        LogRecord::Commit {
            seq: SequenceNumber::new(seq),
            mutations: vec![
                Mutation {
                    key: b"image\0i1".to_vec(),
                    value: Some(Bytes::from_static(b"payload")),
                },
                Mutation {
                    key: b"image\0i2".to_vec(),
                    value: None,
                },
            ],
        }
    }

    #[test]
    fn records_round_trip_through_replay() {
        let mut log = commit(1).encode();
        log.extend(LogRecord::Marker { dirty: true }.encode());
        log.extend(commit(2).encode());

        let replay = replay(&log).unwrap();
        assert_eq!(replay.valid_len, log.len() as u64);
        let records: Vec<_> = replay.records.into_iter().map(|(_, r)| r).collect();
        assert_eq!(
            records,
            vec![commit(1), LogRecord::Marker { dirty: true }, commit(2)]
        );
    }

    #[test]
    fn torn_tail_is_ignored() {
        let first = commit(1).encode();
        let mut log = first.clone();
        let second = commit(2).encode();
        log.extend_from_slice(&second[..second.len() - 3]);

        let replay = replay(&log).unwrap();
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.valid_len, first.len() as u64);
    }

    #[test]
    fn bad_checksum_on_last_record_is_torn() {
        let mut log = commit(1).encode();
        let last = log.len() - 1;
        log[last] ^= 0xff;
        let replay = replay(&log).unwrap();
        assert!(replay.records.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn bad_checksum_mid_log_is_corruption() {
        let mut log = commit(1).encode();
        log[HEADER_SIZE + 2] ^= 0xff;
        log.extend(commit(2).encode());
        assert!(matches!(
            replay(&log),
            Err(CoreError::LogCorruption { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut log = commit(1).encode();
        log[0] = b'X';
        assert!(matches!(replay(&log), Err(CoreError::LogCorruption { .. })));
    }
}

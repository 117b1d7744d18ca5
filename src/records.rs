//! Record-sequence file format
//!
//! Layout:
//! - header: `BFSQ` magic, version byte, key type tag, value type tag
//! - record: u32 (big-endian) payload length, encoded key, encoded value
//!
//! Readers expose the absolute byte position after every record so callers
//! can cut a file into `[start, start + length)` ranges that begin on record
//! boundaries. Input manifests are `(i64, String)` files, task output files are
//! `(String, String)` files.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::marker::PhantomData;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"BFSQ";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: u64 = 7;

const LENGTH_PREFIX: u64 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("not a record file (bad magic)")]
    BadMagic,

    #[error("unsupported record file version: {0}")]
    UnsupportedVersion(u8),

    #[error("{which} type tag mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        which: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("truncated record at offset {0}")]
    Truncated(u64),

    #[error("record at offset {0} has trailing bytes")]
    TrailingBytes(u64),

    #[error("invalid UTF-8 text in record at offset {0}")]
    InvalidText(u64),

    #[error("offset {offset} is outside a file of {len} bytes")]
    OutOfRange { offset: u64, len: u64 },
}

pub type Result<T> = std::result::Result<T, RecordError>;

/// A value that can be stored as a record key or value
pub trait Writable: Sized {
    const TYPE_TAG: u8;

    fn encoded_len(&self) -> usize;

    fn encode(&self, buf: &mut BytesMut);

    /// Decode from `buf`; `offset` is the record start, used for error reporting
    fn decode(buf: &mut Bytes, offset: u64) -> Result<Self>;
}

impl Writable for i64 {
    const TYPE_TAG: u8 = 1;

    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(*self);
    }

    fn decode(buf: &mut Bytes, offset: u64) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(RecordError::Truncated(offset));
        }
        Ok(buf.get_i64())
    }
}

impl Writable for String {
    const TYPE_TAG: u8 = 2;

    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }

    fn decode(buf: &mut Bytes, offset: u64) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(RecordError::Truncated(offset));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(RecordError::Truncated(offset));
        }
        let raw = buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| RecordError::InvalidText(offset))
    }
}

/// Buffers records in memory; [`RecordWriter::finish`] yields the file bytes
pub struct RecordWriter<K, V> {
    buf: BytesMut,
    records: u64,
    _marker: PhantomData<(K, V)>,
}

impl<K: Writable, V: Writable> RecordWriter<K, V> {
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(K::TYPE_TAG);
        buf.put_u8(V::TYPE_TAG);

        Self {
            buf,
            records: 0,
            _marker: PhantomData,
        }
    }

    pub fn append(&mut self, key: &K, value: &V) {
        let len = key.encoded_len() + value.encoded_len();
        self.buf.put_u32(len as u32);
        key.encode(&mut self.buf);
        value.encode(&mut self.buf);
        self.records += 1;
    }

    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl<K: Writable, V: Writable> Default for RecordWriter<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential reader over a whole file or over one byte range of it
pub struct RecordReader<K, V> {
    data: Bytes,
    pos: u64,
    end: u64,
    _marker: PhantomData<(K, V)>,
}

impl<K: Writable, V: Writable> RecordReader<K, V> {
    pub fn new(data: Bytes) -> Result<Self> {
        check_header::<K, V>(&data)?;
        let end = data.len() as u64;

        Ok(Self {
            data,
            pos: HEADER_LEN,
            end,
            _marker: PhantomData,
        })
    }

    /// Reader limited to records starting inside `[start, start + length)`.
    /// `start` must fall on a record boundary.
    pub fn for_range(data: Bytes, start: u64, length: u64) -> Result<Self> {
        let mut reader = Self::new(data)?;
        let len = reader.data.len() as u64;
        if start > len {
            return Err(RecordError::OutOfRange { offset: start, len });
        }

        reader.pos = start.max(HEADER_LEN);
        reader.end = start.saturating_add(length).min(len);
        Ok(reader)
    }

    /// Absolute byte offset of the next record
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn next_record(&mut self) -> Result<Option<(K, V)>> {
        if self.pos >= self.end {
            return Ok(None);
        }

        let offset = self.pos;
        let mut buf = self.data.slice(offset as usize..);
        if (buf.remaining() as u64) < LENGTH_PREFIX {
            return Err(RecordError::Truncated(offset));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(RecordError::Truncated(offset));
        }

        let mut payload = buf.split_to(len);
        let key = K::decode(&mut payload, offset)?;
        let value = V::decode(&mut payload, offset)?;
        if payload.has_remaining() {
            return Err(RecordError::TrailingBytes(offset));
        }

        self.pos = offset + LENGTH_PREFIX + len as u64;
        Ok(Some((key, value)))
    }

    pub fn read_all(mut self) -> Result<Vec<(K, V)>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

fn check_header<K: Writable, V: Writable>(data: &[u8]) -> Result<()> {
    if (data.len() as u64) < HEADER_LEN || &data[..4] != MAGIC {
        return Err(RecordError::BadMagic);
    }
    if data[4] != VERSION {
        return Err(RecordError::UnsupportedVersion(data[4]));
    }
    if data[5] != K::TYPE_TAG {
        return Err(RecordError::TypeMismatch {
            which: "key",
            expected: K::TYPE_TAG,
            found: data[5],
        });
    }
    if data[6] != V::TYPE_TAG {
        return Err(RecordError::TypeMismatch {
            which: "value",
            expected: V::TYPE_TAG,
            found: data[6],
        });
    }
    Ok(())
}

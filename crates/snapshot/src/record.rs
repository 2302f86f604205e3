use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
use thiserror::Error;

/// Magic number at the start of every snapshot file ("VSN1").
pub const SNAPSHOT_MAGIC: u32 = 0x5653_4E31;

/// Size of the fixed file header: magic (4) + kind (1) + record count (4).
pub const HEADER_BYTES: u64 = 9;

/// Maximum key size accepted when writing and reading (64 KiB).
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size accepted when writing and reading (10 MiB).
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DEL: u8 = 1;

/// One change to a partition's key/value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Insert or overwrite `key`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove `key`.
    Del { key: Vec<u8> },
}

impl Record {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<Vec<u8>>) -> Self {
        Self::Del { key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Del { key } => key,
        }
    }
}

/// Errors produced while reading or writing snapshot files.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with [`SNAPSHOT_MAGIC`].
    #[error("not a snapshot file (magic {0:#010x})")]
    BadMagic(u32),

    /// CRC mismatch, unknown op or kind, bad length, or record count mismatch.
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),

    /// A key or value above the size the reader accepts.
    #[error("{what} too large: {len} bytes (max {max})")]
    TooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Base files describe a complete state and cannot carry deletes.
    #[error("base files cannot contain deletes")]
    DeleteInBase,
}

/// Appends the body of `record` to `buf`.
///
/// Keys above [`MAX_KEY_BYTES`] and values above [`MAX_VALUE_BYTES`] are
/// refused, so every file written can be read back.
pub(crate) fn encode_body(buf: &mut Vec<u8>, record: &Record) -> Result<(), FormatError> {
    let key_len = checked_len("key", record.key().len(), MAX_KEY_BYTES)?;
    match record {
        Record::Put { key, value } => {
            let val_len = checked_len("value", value.len(), MAX_VALUE_BYTES)?;
            buf.write_u8(OP_PUT)?;
            buf.write_u32::<LittleEndian>(key_len)?;
            buf.extend_from_slice(key);
            buf.write_u32::<LittleEndian>(val_len)?;
            buf.extend_from_slice(value);
        }
        Record::Del { key } => {
            buf.write_u8(OP_DEL)?;
            buf.write_u32::<LittleEndian>(key_len)?;
            buf.extend_from_slice(key);
        }
    }
    Ok(())
}

fn checked_len(what: &'static str, len: usize, max: usize) -> Result<u32, FormatError> {
    let too_large = || FormatError::TooLarge { what, len, max };
    if len > max {
        return Err(too_large());
    }
    u32::try_from(len).map_err(|_| too_large())
}

/// Parses a CRC-verified record body.
pub(crate) fn decode_body(body: &[u8]) -> Result<Record, FormatError> {
    decode_fields(body).map_err(|e| match e {
        FormatError::Io(_) => FormatError::Corrupt("record body too short"),
        other => other,
    })
}

fn decode_fields(body: &[u8]) -> Result<Record, FormatError> {
    let mut br = body;
    let op = br.read_u8()?;
    let key_len = br.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES || key_len > br.len() {
        return Err(FormatError::Corrupt("key length out of range"));
    }
    let mut key = vec![0u8; key_len];
    br.read_exact(&mut key)?;

    let record = match op {
        OP_PUT => {
            let val_len = br.read_u32::<LittleEndian>()? as usize;
            if val_len > MAX_VALUE_BYTES || val_len > br.len() {
                return Err(FormatError::Corrupt("value length out of range"));
            }
            let mut value = vec![0u8; val_len];
            br.read_exact(&mut value)?;
            Record::Put { key, value }
        }
        OP_DEL => Record::Del { key },
        _ => return Err(FormatError::Corrupt("unknown op code")),
    };

    if !br.is_empty() {
        return Err(FormatError::Corrupt("trailing bytes in record"));
    }
    Ok(record)
}

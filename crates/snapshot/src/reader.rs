use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::naming::VersionKind;
use crate::record::{decode_body, FormatError, Record, HEADER_BYTES, MAX_KEY_BYTES, MAX_VALUE_BYTES, SNAPSHOT_MAGIC};

/// Upper bound on a single framed record: crc + op + two lengths + payloads.
const MAX_RECORD_BYTES: usize = 4 + 1 + 4 + MAX_KEY_BYTES + 4 + MAX_VALUE_BYTES;

/// Sequential reader over one snapshot file.
///
/// [`open`](SnapshotReader::open) validates the header; the records are
/// checked (CRC, lengths, count) as they are replayed.
pub struct SnapshotReader {
    path: PathBuf,
    kind: VersionKind,
    num_records: u32,
    file: BufReader<File>,
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("num_records", &self.num_records)
            .finish()
    }
}

impl SnapshotReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path)?;
        if f.metadata()?.len() < HEADER_BYTES {
            return Err(FormatError::Corrupt("file shorter than header"));
        }
        let mut file = BufReader::new(f);

        let magic = file.read_u32::<LittleEndian>()?;
        if magic != SNAPSHOT_MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let kind = VersionKind::from_tag(file.read_u8()?)
            .ok_or(FormatError::Corrupt("unknown file kind"))?;
        let num_records = file.read_u32::<LittleEndian>()?;

        Ok(Self {
            path,
            kind,
            num_records,
            file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> VersionKind {
        self.kind
    }

    #[must_use]
    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// Feeds every record to `apply`, in file order.
    ///
    /// Returns the number of records replayed.
    ///
    /// # Errors
    ///
    /// [`FormatError::Corrupt`] on a CRC mismatch, an impossible length, a
    /// file that ends early, or bytes past the last record.
    /// [`FormatError::DeleteInBase`] if a base file carries a delete.
    pub fn replay<F>(mut self, mut apply: F) -> Result<u64, FormatError>
    where
        F: FnMut(Record),
    {
        let mut buf: Vec<u8> = Vec::new();
        for _ in 0..self.num_records {
            let record_len = read_u32_or_truncated(&mut self.file)? as usize;
            if !(4..=MAX_RECORD_BYTES).contains(&record_len) {
                return Err(FormatError::Corrupt("record length out of range"));
            }
            buf.resize(record_len, 0);
            self.file.read_exact(&mut buf).map_err(truncated)?;

            let (crc_bytes, body) = buf.split_at(4);
            let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let mut hasher = Crc32::new();
            hasher.update(body);
            if hasher.finalize() != stored_crc {
                return Err(FormatError::Corrupt("crc mismatch"));
            }

            let record = decode_body(body)?;
            if self.kind == VersionKind::Base && matches!(record, Record::Del { .. }) {
                return Err(FormatError::DeleteInBase);
            }
            apply(record);
        }

        let mut trailing = [0u8; 1];
        if self.file.read(&mut trailing)? != 0 {
            return Err(FormatError::Corrupt("data after last record"));
        }
        Ok(u64::from(self.num_records))
    }

    /// All records, in file order.
    pub fn records(self) -> Result<Vec<Record>, FormatError> {
        let mut out = Vec::with_capacity(self.num_records as usize);
        self.replay(|r| out.push(r))?;
        Ok(out)
    }

    /// Applies the file's records on top of `state`: puts overwrite, deletes remove.
    pub fn apply_to(self, state: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> Result<u64, FormatError> {
        self.replay(|record| match record {
            Record::Put { key, value } => {
                state.insert(key, value);
            }
            Record::Del { key } => {
                state.remove(&key);
            }
        })
    }

    /// Reads a whole file into a sorted map.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, FormatError> {
        let mut state = BTreeMap::new();
        Self::open(path)?.apply_to(&mut state)?;
        Ok(state)
    }

    /// Point lookup by full scan. Returns the last value written for `key`.
    pub fn get<P: AsRef<Path>>(path: P, key: &[u8]) -> Result<Option<Vec<u8>>, FormatError> {
        let mut found = None;
        Self::open(path)?.replay(|record| {
            if record.key() == key {
                found = match record {
                    Record::Put { value, .. } => Some(value),
                    Record::Del { .. } => None,
                };
            }
        })?;
        Ok(found)
    }
}

fn truncated(e: io::Error) -> FormatError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Corrupt("file ends mid-record")
    } else {
        FormatError::Io(e)
    }
}

fn read_u32_or_truncated<R: Read>(r: &mut R) -> Result<u32, FormatError> {
    r.read_u32::<LittleEndian>().map_err(truncated)
}

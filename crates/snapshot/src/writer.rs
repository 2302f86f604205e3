use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::naming::VersionKind;
use crate::record::{encode_body, FormatError, Record, SNAPSHOT_MAGIC};

/// Offset of the record count inside the header.
const COUNT_OFFSET: u64 = 5;

/// Size and record count of a written file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub num_records: u64,
    pub num_bytes: u64,
}

/// Writes immutable snapshot files.
///
/// Stateless, like the rest of the file writers: all work happens in
/// [`SnapshotWriter::write`].
pub struct SnapshotWriter {}

impl SnapshotWriter {
    /// Writes `records` to a new file at `path`, in iteration order.
    ///
    /// The data goes to `<path>.tmp` first, is fsynced, and is then renamed
    /// over `path`. On error the temp file is removed and `path` is untouched.
    ///
    /// # Errors
    ///
    /// [`FormatError::DeleteInBase`] if `kind` is [`VersionKind::Base`] and a
    /// delete is encountered, [`FormatError::TooLarge`] for a key or value the
    /// reader would reject, or any I/O failure.
    pub fn write<I>(path: &Path, kind: VersionKind, records: I) -> Result<WriteSummary, FormatError>
    where
        I: IntoIterator<Item = Record>,
    {
        let tmp_path = path.with_extension(format!("{}.tmp", kind.extension()));
        match Self::write_tmp(&tmp_path, kind, records) {
            Ok(summary) => {
                fs::rename(&tmp_path, path)?;
                if let Some(parent) = path.parent() {
                    if let Ok(dir) = fs::File::open(parent) {
                        let _ = dir.sync_all();
                    }
                }
                Ok(summary)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    fn write_tmp<I>(tmp_path: &Path, kind: VersionKind, records: I) -> Result<WriteSummary, FormatError>
    where
        I: IntoIterator<Item = Record>,
    {
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        // count is patched in once all records are written
        file.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
        file.write_u8(kind.tag())?;
        file.write_u32::<LittleEndian>(0)?;

        let mut body: Vec<u8> = Vec::with_capacity(256);
        let mut count: u32 = 0;
        for record in records {
            if kind == VersionKind::Base && matches!(record, Record::Del { .. }) {
                return Err(FormatError::DeleteInBase);
            }
            body.clear();
            encode_body(&mut body, &record)?;

            let mut hasher = Crc32::new();
            hasher.update(&body);
            let crc = hasher.finalize();

            // [record_len][crc][body], record_len covers crc + body
            let record_len = u32::try_from(4 + body.len())
                .map_err(|_| FormatError::Corrupt("record too large to frame"))?;
            file.write_u32::<LittleEndian>(record_len)?;
            file.write_u32::<LittleEndian>(crc)?;
            file.write_all(&body)?;
            count = count
                .checked_add(1)
                .ok_or(FormatError::Corrupt("too many records for one file"))?;
        }

        let num_bytes = file.stream_position()?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_u32::<LittleEndian>(count)?;
        file.flush()?;
        file.into_inner().map_err(io::Error::from)?.sync_all()?;

        Ok(WriteSummary {
            num_records: u64::from(count),
            num_bytes,
        })
    }
}

//! # Snapshot - Partition Version Files
//!
//! The storage format for one partition's share of a domain version, and the
//! [`updater::PartitionFormat`] implementation built on it.
//!
//! Every version of every partition is one immutable file:
//!
//! - a **base** file holds the complete key/value set (puts only);
//! - a **delta** file holds the puts and deletes to apply on top of its parent.
//!
//! Applying a plan loads the base into a sorted map, replays each delta in
//! order, and writes the result as a new base file named after the target.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (9 bytes)                                               │
//! │ magic (u32 LE) "VSN1" | kind (u8: 0 = base, 1 = delta)         │
//! │ record_count (u32 LE)                                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ RECORDS (record_count times)                                   │
//! │                                                               │
//! │ record_len (u32) | crc32 (u32) | body                          │
//! │ body (put): op=0 (u8) | key_len (u32) | key | val_len (u32) | val │
//! │ body (del): op=1 (u8) | key_len (u32) | key                    │
//! │                                                               │
//! │ record_len counts the CRC and the body. The CRC covers the     │
//! │ body only.                                                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are written to `<name>.tmp`, fsynced, then renamed into place, so a
//! reader never observes a partial file. A short or over-long file is corrupt.
//!
//! ## File names
//!
//! `<version, 10 digits>.base` and `<version, 10 digits>.delta`, e.g.
//! `0000000042.delta`.
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                   |
//! |--------------|-----------------------------------------------------------|
//! | [`record`]   | `Record`, `FormatError`, body encoding                    |
//! | [`naming`]   | `VersionKind`, file names, directory scans                |
//! | [`writer`]   | `SnapshotWriter` (atomic tmp + rename)                    |
//! | [`reader`]   | `SnapshotReader` (header check, CRC-verified replay)       |
//! | [`remote`]   | `LocalRemoteStore` + remote version deleter               |
//! | [`partition`] | `SnapshotPartition`: the update pipeline's format hooks   |

mod naming;
mod partition;
mod reader;
mod record;
mod remote;
mod writer;

pub use naming::{file_name, parse_file_name, scan_versions, VersionKind};
pub use partition::{SnapshotPartition, MERGE_PHASE};
pub use reader::SnapshotReader;
pub use record::{FormatError, Record, HEADER_BYTES, MAX_KEY_BYTES, MAX_VALUE_BYTES, SNAPSHOT_MAGIC};
pub use remote::{LocalRemoteStore, RemoteVersionDeleter};
pub use writer::{SnapshotWriter, WriteSummary};

#[cfg(test)]
mod tests;

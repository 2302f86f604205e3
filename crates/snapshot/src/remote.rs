/// Remote version storage backed by a local directory tree.
///
/// Layout: `<root>/<domain>/<partition>/<version file>`. Writers publish each
/// partition's share of a version here before closing the version; updaters
/// fetch from here; the cleaner deletes from here.
use anyhow::{Context, Result};
use cleaner::RemoteDomainVersionDeleter;
use domain::{DomainVersion, PartitionInfo, VersionNumber};
use std::fs;
use std::path::{Path, PathBuf};

use crate::naming::{file_name, VersionKind};
use crate::reader::SnapshotReader;
use crate::record::Record;
use crate::writer::SnapshotWriter;

#[derive(Debug, Clone)]
pub struct LocalRemoteStore {
    root: PathBuf,
}

impl LocalRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn partition_dir(&self, domain: &str, partition: u32) -> PathBuf {
        self.root.join(domain).join(partition.to_string())
    }

    #[must_use]
    pub fn file_path(&self, domain: &str, partition: u32, version: VersionNumber, kind: VersionKind) -> PathBuf {
        self.partition_dir(domain, partition).join(file_name(version, kind))
    }

    /// Writes one partition's share of `version`.
    ///
    /// Returns the size information to report when closing the version.
    pub fn publish<I>(
        &self,
        domain: &str,
        partition: u32,
        version: VersionNumber,
        kind: VersionKind,
        records: I,
    ) -> Result<PartitionInfo>
    where
        I: IntoIterator<Item = Record>,
    {
        let dir = self.partition_dir(domain, partition);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(file_name(version, kind));
        let summary = SnapshotWriter::write(&path, kind, records)
            .with_context(|| format!("failed to publish {}", path.display()))?;
        tracing::debug!(
            domain,
            partition,
            version,
            records = summary.num_records,
            bytes = summary.num_bytes,
            "published version file"
        );
        Ok(PartitionInfo {
            partition,
            num_bytes: summary.num_bytes,
            num_records: summary.num_records,
        })
    }

    /// Copies the file of `version` for `partition` into `dest_dir`.
    ///
    /// The copy's header is checked before returning.
    pub fn fetch(&self, domain: &str, partition: u32, version: &DomainVersion, dest_dir: &Path) -> Result<PathBuf> {
        let kind = VersionKind::of(version);
        let src = self.file_path(domain, partition, version.number, kind);
        let dst = dest_dir.join(file_name(version.number, kind));
        fs::copy(&src, &dst)
            .with_context(|| format!("failed to fetch {} into {}", src.display(), dest_dir.display()))?;
        SnapshotReader::open(&dst).with_context(|| format!("fetched file {} is invalid", src.display()))?;
        Ok(dst)
    }

    /// A deleter purging versions of `domain` across `num_partitions` partitions.
    #[must_use]
    pub fn deleter(&self, domain: &str, num_partitions: u32) -> RemoteVersionDeleter {
        RemoteVersionDeleter {
            store: self.clone(),
            domain: domain.to_string(),
            num_partitions,
        }
    }
}

/// Deletes one domain's version files from a [`LocalRemoteStore`].
#[derive(Debug, Clone)]
pub struct RemoteVersionDeleter {
    store: LocalRemoteStore,
    domain: String,
    num_partitions: u32,
}

impl RemoteDomainVersionDeleter for RemoteVersionDeleter {
    /// Removes the version's file from every partition. Missing files are fine.
    fn delete_version(&self, version: VersionNumber) -> Result<()> {
        let mut removed = 0usize;
        for partition in 0..self.num_partitions {
            for kind in [VersionKind::Base, VersionKind::Delta] {
                let path = self.store.file_path(&self.domain, partition, version, kind);
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("failed to delete {}", path.display()))
                    }
                }
            }
        }
        tracing::debug!(domain = %self.domain, version, removed, "deleted remote version files");
        Ok(())
    }
}

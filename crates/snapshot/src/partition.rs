/// `PartitionFormat` for snapshot files: one merged base file at the root,
/// earlier bases and deltas under `cache/`.
use anyhow::{bail, Context, Result};
use domain::{Domain, DomainVersion, VersionNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use updater::workspace::CACHE_DIR;
use updater::{PartitionFormat, UpdatePlan, UpdateStatistics};

use crate::naming::{file_name, scan_versions, VersionKind};
use crate::reader::SnapshotReader;
use crate::record::Record;
use crate::remote::LocalRemoteStore;
use crate::writer::SnapshotWriter;

/// Statistics key for the time spent merging base and deltas.
pub const MERGE_PHASE: &str = "Update merge";

/// One partition of a domain stored as snapshot files.
///
/// The root holds exactly one `<version>.base` file: the fully merged state of
/// the version being served. Whatever version that is, it is stored as a base.
#[derive(Debug, Clone)]
pub struct SnapshotPartition {
    root: PathBuf,
    remote: LocalRemoteStore,
    domain: String,
    partition: u32,
    cache_bases: usize,
}

impl SnapshotPartition {
    /// `cache_bases` is how many base files `cache/` retains after an update.
    pub fn new(
        root: impl Into<PathBuf>,
        remote: LocalRemoteStore,
        domain: impl Into<String>,
        partition: u32,
        cache_bases: usize,
    ) -> Self {
        Self {
            root: root.into(),
            remote,
            domain: domain.into(),
            partition,
            cache_bases,
        }
    }

    #[must_use]
    pub fn partition(&self) -> u32 {
        self.partition
    }

    fn cache_root(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    fn current_path(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .detect_current_version_number()?
            .map(|n| self.root.join(file_name(n, VersionKind::Base))))
    }

    /// Value of `key` in the version currently served.
    ///
    /// `None` if the key is absent or the partition has no version yet.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.current_path()? else {
            return Ok(None);
        };
        SnapshotReader::get(&path, key).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Full key/value set of the version currently served.
    pub fn load_current(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let Some(path) = self.current_path()? else {
            return Ok(BTreeMap::new());
        };
        SnapshotReader::load(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn base_path(&self, current: Option<&DomainVersion>, base: VersionNumber) -> PathBuf {
        let name = file_name(base, VersionKind::Base);
        if current.map(|v| v.number) == Some(base) {
            self.root.join(name)
        } else {
            self.cache_root().join(name)
        }
    }
}

impl PartitionFormat for SnapshotPartition {
    fn root(&self) -> &Path {
        &self.root
    }

    fn detect_current_version_number(&self) -> Result<Option<VersionNumber>> {
        let found = scan_versions(&self.root, VersionKind::Base)?;
        if found.len() > 1 {
            bail!(
                "partition root {} holds {} versions ({:?}), expected at most one",
                self.root.display(),
                found.len(),
                found
            );
        }
        Ok(found.into_iter().next())
    }

    fn detect_cached_bases_core(&self) -> Result<BTreeSet<VersionNumber>> {
        scan_versions(&self.cache_root(), VersionKind::Base)
    }

    fn detect_cached_deltas_core(&self) -> Result<BTreeSet<VersionNumber>> {
        scan_versions(&self.cache_root(), VersionKind::Delta)
    }

    /// Keeps only what can help a future update along the current chain: the
    /// newest `cache_bases` bases of that chain, plus its deltas newer than
    /// the oldest kept base. Without a current version the cache is left alone
    /// so a retried first update can reuse what it already fetched.
    fn clean_cached_versions(&self, domain: &Domain) -> Result<()> {
        let Some(current) = self.detect_current_version_number()? else {
            return Ok(());
        };
        let chain = live_chain(domain, current);

        let cache = self.cache_root();
        let bases = self.detect_cached_bases_core()?;
        let deltas = self.detect_cached_deltas_core()?;

        let kept_bases: BTreeSet<VersionNumber> = bases
            .iter()
            .rev()
            .filter(|n| chain.contains(*n))
            .take(self.cache_bases)
            .copied()
            .collect();
        let oldest_kept_base = kept_bases.first().copied();
        let keep_delta = |n: VersionNumber| {
            chain.contains(&n) && oldest_kept_base.map(|b| n > b).unwrap_or(false)
        };

        let mut evicted = 0usize;
        for &n in bases.iter().filter(|n| !kept_bases.contains(*n)) {
            remove_cached(&cache.join(file_name(n, VersionKind::Base)))?;
            evicted += 1;
        }
        for &n in deltas.iter().filter(|n| !keep_delta(**n)) {
            remove_cached(&cache.join(file_name(n, VersionKind::Delta)))?;
            evicted += 1;
        }
        if evicted > 0 {
            tracing::info!(
                domain = %self.domain,
                partition = self.partition,
                current,
                evicted,
                kept_bases = ?kept_bases,
                "evicted cached versions"
            );
        }
        Ok(())
    }

    fn fetch_version(&self, version: &DomainVersion, dest_root: &Path) -> Result<()> {
        let path = self
            .remote
            .fetch(&self.domain, self.partition, version, dest_root)?;
        tracing::debug!(
            domain = %self.domain,
            partition = self.partition,
            version = version.number,
            path = %path.display(),
            "fetched version"
        );
        Ok(())
    }

    fn run_update_core(
        &self,
        current: Option<&DomainVersion>,
        target: &DomainVersion,
        plan: &UpdatePlan,
        work_root: &Path,
        stats: &mut UpdateStatistics,
    ) -> Result<()> {
        let start = Instant::now();

        let base_path = self.base_path(current, plan.base.number);
        let mut state = SnapshotReader::load(&base_path)
            .with_context(|| format!("failed to load base {}", base_path.display()))?;
        for delta in &plan.deltas {
            let path = self.cache_root().join(file_name(delta.number, VersionKind::Delta));
            SnapshotReader::open(&path)
                .and_then(|reader| reader.apply_to(&mut state))
                .with_context(|| format!("failed to apply delta {}", path.display()))?;
        }

        let out = work_root.join(file_name(target.number, VersionKind::Base));
        let summary = SnapshotWriter::write(
            &out,
            VersionKind::Base,
            state.into_iter().map(|(key, value)| Record::Put { key, value }),
        )
        .with_context(|| format!("failed to write {}", out.display()))?;

        stats.record_since(MERGE_PHASE, start);
        tracing::debug!(
            partition = self.partition,
            target = target.number,
            deltas = plan.deltas.len(),
            records = summary.num_records,
            "merged version"
        );
        Ok(())
    }
}

/// `current` and its ancestors that still have data. The walk stops at a
/// parent whose metadata has been deleted.
fn live_chain(domain: &Domain, current: VersionNumber) -> BTreeSet<VersionNumber> {
    let mut chain = BTreeSet::new();
    let mut cursor = domain.version(current);
    while let Some(v) = cursor {
        if !v.is_defunct() {
            chain.insert(v.number);
        }
        cursor = v.parent().and_then(|p| domain.version(p));
    }
    chain
}

fn remove_cached(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to evict {}", path.display())),
    }
}

/// The per-partition update pipeline: plan, fetch, commit, apply, promote.
use anyhow::{bail, Context, Result};
use domain::{Coordinator, Domain, DomainVersion, VersionNumber};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::workspace::{self, CACHE_DIR, FETCH_PREFIX, UPDATE_WORK_PREFIX};
use crate::{compute_update_plan, UpdatePlan, UpdateStatistics, EXECUTION_PHASE, FETCH_PHASE};

/// Storage-format hooks the update pipeline is built on.
///
/// The pipeline decides *which* versions are needed and manages directories
/// and renames; the format decides how version data is named on disk, how it
/// is transferred, and how a base plus deltas are merged.
pub trait PartitionFormat {
    /// The partition's root directory.
    fn root(&self) -> &Path;

    /// Version currently served from the partition root, if any.
    fn detect_current_version_number(&self) -> Result<Option<VersionNumber>>;

    /// Versions present in `cache/` in a form usable as a base.
    fn detect_cached_bases_core(&self) -> Result<BTreeSet<VersionNumber>>;

    /// Versions present in `cache/` as deltas.
    fn detect_cached_deltas_core(&self) -> Result<BTreeSet<VersionNumber>>;

    /// Evicts cache entries the format no longer considers useful.
    ///
    /// Called after every update attempt, successful or not.
    fn clean_cached_versions(&self, domain: &Domain) -> Result<()>;

    /// Copies one version's data for this partition into `dest_root`.
    fn fetch_version(&self, version: &DomainVersion, dest_root: &Path) -> Result<()>;

    /// Builds the complete representation of `target` inside `work_root`.
    ///
    /// The plan's versions are available either in `cache/` or, for the
    /// current version, in the partition root.
    fn run_update_core(
        &self,
        current: Option<&DomainVersion>,
        target: &DomainVersion,
        plan: &UpdatePlan,
        work_root: &Path,
        stats: &mut UpdateStatistics,
    ) -> Result<()>;
}

/// Drives updates of one partition to successive target versions.
///
/// Holds a snapshot of the domain's version graph taken when the updater was
/// built; refresh it with [`PartitionUpdater::set_domain`] before each update
/// if the graph may have moved on.
pub struct PartitionUpdater<F> {
    domain: Domain,
    format: F,
    coordinator_to_close: Option<Arc<dyn Coordinator>>,
}

impl<F: PartitionFormat> std::fmt::Debug for PartitionUpdater<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionUpdater")
            .field("domain", &self.domain.name())
            .field("root", &self.format.root())
            .field("closes_coordinator", &self.coordinator_to_close.is_some())
            .finish()
    }
}

impl<F: PartitionFormat> PartitionUpdater<F> {
    pub fn new(domain: Domain, format: F) -> Self {
        Self {
            domain,
            format,
            coordinator_to_close: None,
        }
    }

    /// Registers a coordinator handle to close as soon as a plan is computed.
    ///
    /// Everything after planning is local file I/O, so the metadata
    /// connection does not need to stay open for the rest of the update.
    pub fn close_coordinator_after_planning(&mut self, coordinator: Arc<dyn Coordinator>) {
        self.coordinator_to_close = Some(coordinator);
    }

    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn set_domain(&mut self, domain: Domain) {
        self.domain = domain;
    }

    #[must_use]
    pub fn format(&self) -> &F {
        &self.format
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.format.root()
    }

    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.format.root().join(CACHE_DIR)
    }

    /// The version the partition currently serves, resolved against the domain.
    ///
    /// A version number the domain no longer knows is treated as no version at
    /// all, so the next update rebuilds from a base.
    pub fn detect_current_version(&self) -> Result<Option<DomainVersion>> {
        let Some(number) = self.format.detect_current_version_number()? else {
            return Ok(None);
        };
        match self.domain.version(number) {
            Some(v) => Ok(Some(v.clone())),
            None => {
                tracing::warn!(
                    domain = self.domain.name(),
                    version = number,
                    "on-disk version is unknown to the domain, ignoring it"
                );
                Ok(None)
            }
        }
    }

    /// Cached bases that are known to the domain and not defunct.
    pub fn detect_cached_bases(&self) -> Result<Vec<DomainVersion>> {
        Ok(self.resolve_cached(self.format.detect_cached_bases_core()?))
    }

    /// Cached deltas that are known to the domain and not defunct.
    pub fn detect_cached_deltas(&self) -> Result<Vec<DomainVersion>> {
        Ok(self.resolve_cached(self.format.detect_cached_deltas_core()?))
    }

    fn resolve_cached(&self, numbers: BTreeSet<VersionNumber>) -> Vec<DomainVersion> {
        numbers
            .into_iter()
            .filter_map(|n| match self.domain.version(n) {
                Some(v) if !v.is_defunct() => Some(v.clone()),
                Some(_) => {
                    tracing::debug!(version = n, "ignoring cached copy of defunct version");
                    None
                }
                None => {
                    tracing::debug!(version = n, "ignoring cached copy of unknown version");
                    None
                }
            })
            .collect()
    }

    /// Computes the plan `update_to(target)` would execute, without side effects.
    pub fn plan(&self, target: VersionNumber) -> Result<Option<UpdatePlan>> {
        let target = self.domain.require_version(target)?;
        let current = self.detect_current_version()?;
        let cached_bases: BTreeSet<VersionNumber> =
            self.detect_cached_bases()?.iter().map(|v| v.number).collect();
        Ok(compute_update_plan(
            &self.domain,
            current.as_ref(),
            &cached_bases,
            target,
        )?)
    }

    /// Brings the partition to `target`.
    ///
    /// On success the partition root holds exactly the files of `target` and
    /// the outgoing files have moved to `cache/`. On failure before promotion
    /// the partition still serves its previous version. The format's
    /// `clean_cached_versions` hook runs in every case.
    ///
    /// Durations are recorded in `stats` under [`FETCH_PHASE`] and
    /// [`EXECUTION_PHASE`], including for a phase that fails.
    pub fn update_to(&mut self, target: &DomainVersion, stats: &mut UpdateStatistics) -> Result<()> {
        let result = self.run_update(target, stats);
        let cleaned = self
            .format
            .clean_cached_versions(&self.domain)
            .context("failed to clean cached versions");
        match (result, cleaned) {
            (Ok(()), cleaned) => cleaned,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(clean_err)) => {
                tracing::error!(error = %clean_err, "cache cleanup failed after failed update");
                Err(e)
            }
        }
    }

    fn run_update(&mut self, target: &DomainVersion, stats: &mut UpdateStatistics) -> Result<()> {
        let root = self.format.root().to_path_buf();
        let cache = root.join(CACHE_DIR);
        workspace::ensure_dir(&root)?;
        workspace::ensure_dir(&cache)?;

        let target = self.domain.require_version(target.number)?.clone();
        if target.is_defunct() {
            bail!(
                "cannot update {} to v{}: version is defunct",
                self.domain.name(),
                target.number
            );
        }

        let current = self.detect_current_version()?;
        let cached_bases: BTreeSet<VersionNumber> =
            self.detect_cached_bases()?.iter().map(|v| v.number).collect();
        let cached_deltas: BTreeSet<VersionNumber> =
            self.detect_cached_deltas()?.iter().map(|v| v.number).collect();

        let plan = match compute_update_plan(&self.domain, current.as_ref(), &cached_bases, &target)? {
            Some(plan) => plan,
            None => {
                tracing::info!(
                    domain = self.domain.name(),
                    root = %root.display(),
                    version = target.number,
                    "partition already up to date"
                );
                return Ok(());
            }
        };
        tracing::info!(
            domain = self.domain.name(),
            root = %root.display(),
            current = ?current.as_ref().map(|v| v.number),
            target = target.number,
            plan = %plan,
            "computed update plan"
        );

        if let Some(coordinator) = self.coordinator_to_close.take() {
            if let Err(e) = coordinator.close() {
                tracing::warn!(error = %e, "failed to close coordinator after planning");
            }
        }

        let current_number = current.as_ref().map(|v| v.number);
        let format = &self.format;

        // fetch + cache commit
        let fetch_start = Instant::now();
        let fetched = workspace::with_workspace(&root, FETCH_PREFIX, |fetch_root| {
            let mut fetched = 0usize;
            for version in plan.versions() {
                let local = current_number == Some(version.number)
                    || cached_bases.contains(&version.number)
                    || cached_deltas.contains(&version.number);
                if local {
                    tracing::debug!(version = version.number, "using local copy");
                    continue;
                }
                format
                    .fetch_version(version, fetch_root)
                    .with_context(|| format!("failed to fetch v{}", version.number))?;
                fetched += 1;
            }
            workspace::move_files(fetch_root, &cache)
                .context("failed to commit fetched versions to cache")?;
            Ok(fetched)
        });
        stats.record_since(FETCH_PHASE, fetch_start);
        let fetched = fetched.map_err(|e| log_failure("fetch", &plan, e))?;
        tracing::info!(fetched, elapsed_ms = stats.millis(FETCH_PHASE), "fetch phase complete");

        // apply + promote
        let exec_start = Instant::now();
        let applied = workspace::with_workspace(&root, UPDATE_WORK_PREFIX, |work_root| {
            format
                .run_update_core(current.as_ref(), &target, &plan, work_root, stats)
                .context("failed to apply update plan")?;
            workspace::move_files(&root, &cache).context("failed to move outgoing version to cache")?;
            workspace::move_files(work_root, &root).context("failed to promote new version")?;
            Ok(())
        });
        stats.record_since(EXECUTION_PHASE, exec_start);
        applied.map_err(|e| log_failure("apply", &plan, e))?;
        tracing::info!(
            version = target.number,
            elapsed_ms = stats.millis(EXECUTION_PHASE),
            "partition updated"
        );

        Ok(())
    }
}

fn log_failure(phase: &str, plan: &UpdatePlan, err: anyhow::Error) -> anyhow::Error {
    tracing::warn!(phase, plan = %plan, error = %format!("{:#}", err), "update failed");
    err
}

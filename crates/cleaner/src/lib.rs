//! # Cleaner - Remote Version Garbage Collection
//!
//! Reclaims remote storage by purging versions that no retained version
//! depends on.
//!
//! ## Retention Rule
//!
//! Keep the `N` newest *leaves* together with their full ancestry; everything
//! else is garbage. The leaves are found by repeatedly taking the newest
//! closed version not yet accounted for:
//!
//! ```text
//!   candidates = closed versions
//!   repeat N times:
//!       leaf = max(candidates)
//!       keep   += ancestry(leaf)
//!       candidates -= ancestry(leaf)
//!   delete = candidates
//! ```
//!
//! Example with `N = 2`:
//!
//! ```text
//!   v0 <── v1 <── v2 <── v5        leaf #1 = v5 → keep v5 v2 v1 v0
//!   v3 <── v4                      leaf #2 = v4 → keep v4 v3
//!   v6 (open)                      never a candidate
//! ```
//!
//! Because every version on a kept chain stays, a partition serving any kept
//! version (or caching one as a base) can always be brought forward.
//!
//! ## Deletion Order
//!
//! Doomed versions are processed newest first. Each is marked defunct before
//! its remote data is deleted, so updaters stop treating it as a source first.
//! With metadata deletion enabled, children lose their metadata before their
//! parents. A purged version that is still the parent of a surviving entry (an
//! open version, or one purged by an earlier run) keeps its metadata as a
//! defunct anchor, so every remaining parent pointer resolves. Versions that
//! are already defunct are skipped, which makes re-runs harmless.
use anyhow::{Context, Result};
use domain::{Coordinator, Domain, VersionNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Purges one version's remote data in every partition.
pub trait RemoteDomainVersionDeleter {
    fn delete_version(&self, version: VersionNumber) -> Result<()>;
}

/// Which closed versions survive a retention pass and which do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retention {
    pub keep: BTreeSet<VersionNumber>,
    pub delete: BTreeSet<VersionNumber>,
}

/// Splits the closed versions of `domain` into kept and deletable sets.
///
/// Open versions are neither kept nor deleted. With `num_versions_to_keep == 0`
/// retention is disabled and nothing is deletable.
#[must_use]
pub fn compute_retention(domain: &Domain, num_versions_to_keep: usize) -> Retention {
    if num_versions_to_keep == 0 {
        return Retention::default();
    }

    let parents: BTreeMap<VersionNumber, Option<VersionNumber>> = domain
        .closed_versions()
        .map(|v| (v.number, v.parent()))
        .collect();
    let mut candidates: BTreeSet<VersionNumber> = parents.keys().copied().collect();
    let mut keep = BTreeSet::new();

    for _ in 0..num_versions_to_keep {
        let Some(leaf) = candidates.last().copied() else {
            break;
        };
        let mut cursor = Some(leaf);
        while let Some(n) = cursor {
            // stop at versions that are not closed (or no longer exist)
            let Some(parent) = parents.get(&n) else {
                break;
            };
            if !keep.insert(n) {
                // the rest of this chain is already kept
                break;
            }
            candidates.remove(&n);
            cursor = *parent;
        }
    }

    Retention {
        keep,
        delete: candidates,
    }
}

/// Outcome of one [`RemoteDomainCleaner::delete_old_versions`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub kept: Vec<VersionNumber>,
    /// Versions purged by this run, newest first.
    pub deleted: Vec<VersionNumber>,
    /// Deletable versions that an earlier run already purged.
    pub already_defunct: Vec<VersionNumber>,
    /// Purged versions whose metadata stayed because another entry still
    /// names them as parent.
    pub metadata_kept: Vec<VersionNumber>,
}

/// Garbage collector for one domain's remote versions.
pub struct RemoteDomainCleaner {
    coordinator: Arc<dyn Coordinator>,
    domain: String,
    num_versions_to_keep: usize,
}

impl std::fmt::Debug for RemoteDomainCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDomainCleaner")
            .field("domain", &self.domain)
            .field("num_versions_to_keep", &self.num_versions_to_keep)
            .finish()
    }
}

impl RemoteDomainCleaner {
    /// `num_versions_to_keep == 0` disables cleaning.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        domain: impl Into<String>,
        num_versions_to_keep: usize,
    ) -> Self {
        Self {
            coordinator,
            domain: domain.into(),
            num_versions_to_keep,
        }
    }

    #[must_use]
    pub fn num_versions_to_keep(&self) -> usize {
        self.num_versions_to_keep
    }

    /// Purges every version not reachable from the newest retained leaves.
    ///
    /// Each purged version is marked defunct, its remote files are deleted
    /// through `deleter`, and with `delete_metadata` its graph entry is
    /// removed as well.
    ///
    /// Metadata is only removed for versions no remaining entry depends on.
    ///
    /// # Errors
    ///
    /// Stops at the first coordinator or deleter failure. Versions processed
    /// before the failure stay processed. A version whose remote delete failed
    /// is already marked defunct and will be skipped by later runs.
    pub fn delete_old_versions(
        &self,
        deleter: &dyn RemoteDomainVersionDeleter,
        delete_metadata: bool,
    ) -> Result<CleanReport> {
        if self.num_versions_to_keep == 0 {
            tracing::debug!(domain = %self.domain, "retention disabled, nothing to clean");
            return Ok(CleanReport::default());
        }

        let domain = self.coordinator.domain(&self.domain)?;
        // entries whose metadata is still present, shrinking as this run removes them
        let mut remaining: BTreeMap<VersionNumber, Option<VersionNumber>> =
            domain.versions().map(|v| (v.number, v.parent())).collect();
        let retention = compute_retention(&domain, self.num_versions_to_keep);
        let mut report = CleanReport {
            kept: retention.keep.iter().copied().collect(),
            ..CleanReport::default()
        };

        for &number in retention.delete.iter().rev() {
            let Some(version) = domain.version(number) else {
                continue;
            };
            if version.is_defunct() {
                report.already_defunct.push(number);
                continue;
            }

            self.coordinator
                .set_defunct(&self.domain, number, true)
                .with_context(|| format!("failed to mark v{} of {} defunct", number, self.domain))?;
            deleter
                .delete_version(number)
                .with_context(|| format!("failed to delete remote data of v{} of {}", number, self.domain))?;
            if delete_metadata {
                let child = remaining
                    .iter()
                    .find(|(n, parent)| **n != number && **parent == Some(number))
                    .map(|(n, _)| *n);
                match child {
                    Some(child) => {
                        tracing::info!(
                            domain = %self.domain,
                            version = number,
                            child,
                            "keeping metadata of purged version, still referenced as parent"
                        );
                        report.metadata_kept.push(number);
                    }
                    None => {
                        self.coordinator
                            .delete_version(&self.domain, number)
                            .with_context(|| {
                                format!("failed to delete metadata of v{} of {}", number, self.domain)
                            })?;
                        remaining.remove(&number);
                    }
                }
            }
            tracing::info!(domain = %self.domain, version = number, delete_metadata, "purged version");
            report.deleted.push(number);
        }

        tracing::info!(
            domain = %self.domain,
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            already_defunct = report.already_defunct.len(),
            "cleaned domain"
        );
        Ok(report)
    }
}

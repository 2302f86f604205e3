/// The version graph of one domain, stored as an arena keyed by version number.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{DomainVersion, GraphError, PartitionInfo, VersionNumber, VersionProperties};

/// A named, partitioned dataset and all of its known versions.
///
/// Versions are held in a `BTreeMap` so that iteration is always in ascending
/// version order. Parent pointers are plain numbers resolved through
/// [`Domain::parent_of`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    name: String,
    num_partitions: u32,
    #[serde(default)]
    versions: BTreeMap<VersionNumber, DomainVersion>,
}

impl Domain {
    pub fn new(name: impl Into<String>, num_partitions: u32) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            versions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    /// Fails with [`GraphError::InvalidPartition`] if `partition` is out of range.
    pub fn check_partition(&self, partition: u32) -> Result<(), GraphError> {
        if partition < self.num_partitions {
            Ok(())
        } else {
            Err(GraphError::InvalidPartition {
                domain: self.name.clone(),
                partition,
                num_partitions: self.num_partitions,
            })
        }
    }

    #[must_use]
    pub fn version(&self, number: VersionNumber) -> Option<&DomainVersion> {
        self.versions.get(&number)
    }

    /// Like [`Domain::version`] but fails with [`GraphError::UnknownVersion`].
    pub fn require_version(&self, number: VersionNumber) -> Result<&DomainVersion, GraphError> {
        self.versions
            .get(&number)
            .ok_or_else(|| GraphError::UnknownVersion {
                domain: self.name.clone(),
                version: number,
            })
    }

    /// All versions in ascending order, including open and defunct ones.
    pub fn versions(&self) -> impl Iterator<Item = &DomainVersion> {
        self.versions.values()
    }

    /// Closed versions (defunct included) in ascending order.
    pub fn closed_versions(&self) -> impl Iterator<Item = &DomainVersion> {
        self.versions.values().filter(|v| v.is_closed())
    }

    /// Newest closed version that still has data.
    #[must_use]
    pub fn latest_closed_version(&self) -> Option<&DomainVersion> {
        self.versions
            .values()
            .rev()
            .find(|v| v.is_closed() && !v.is_defunct())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The number the next opened version will receive.
    #[must_use]
    pub fn next_version_number(&self) -> VersionNumber {
        self.versions
            .keys()
            .next_back()
            .map(|n| n + 1)
            .unwrap_or(0)
    }

    /// Resolves the parent of `version`.
    ///
    /// Returns `Ok(None)` for a base. A delta whose parent is missing from the
    /// arena yields [`GraphError::UnknownParent`].
    pub fn parent_of(&self, version: &DomainVersion) -> Result<Option<&DomainVersion>, GraphError> {
        match version.parent() {
            None => Ok(None),
            Some(parent) => self
                .versions
                .get(&parent)
                .map(Some)
                .ok_or_else(|| GraphError::UnknownParent {
                    domain: self.name.clone(),
                    version: version.number,
                    parent,
                }),
        }
    }

    /// Returns `number` followed by all of its ancestors, newest first.
    ///
    /// Defunct versions are included: they are part of the chain even though
    /// their data is gone.
    pub fn ancestry(&self, number: VersionNumber) -> Result<Vec<VersionNumber>, GraphError> {
        let mut chain = Vec::new();
        let mut current = Some(self.require_version(number)?);
        while let Some(v) = current {
            chain.push(v.number);
            current = self.parent_of(v)?;
        }
        Ok(chain)
    }

    /// Inserts (or replaces) a version.
    ///
    /// A delta must point at a strictly older version number; this keeps the
    /// graph acyclic. The parent itself does not need to be present yet, so
    /// that graphs can be loaded in any order, see [`Domain::validate`].
    pub fn insert_version(&mut self, version: DomainVersion) -> Result<(), GraphError> {
        self.check_parent_order(&version)?;
        self.versions.insert(version.number, version);
        Ok(())
    }

    /// Checks that every delta's parent exists and is older than the delta.
    pub fn validate(&self) -> Result<(), GraphError> {
        for v in self.versions.values() {
            self.check_parent_order(v)?;
            self.parent_of(v)?;
        }
        Ok(())
    }

    fn check_parent_order(&self, version: &DomainVersion) -> Result<(), GraphError> {
        match version.parent() {
            Some(parent) if parent >= version.number => Err(GraphError::ParentNotOlder {
                domain: self.name.clone(),
                version: version.number,
                parent,
            }),
            _ => Ok(()),
        }
    }

    // ---------------- build-pipeline mutations ----------------

    /// Allocates the next version number and records a new open version.
    pub fn open_version(&mut self, properties: VersionProperties) -> Result<VersionNumber, GraphError> {
        let number = self.next_version_number();
        if let Some(parent) = properties.parent() {
            if !self.versions.contains_key(&parent) {
                return Err(GraphError::UnknownParent {
                    domain: self.name.clone(),
                    version: number,
                    parent,
                });
            }
        }
        self.insert_version(DomainVersion::open(number, properties))?;
        Ok(number)
    }

    /// Freezes an open version, recording its per-partition sizes.
    pub fn close_version(
        &mut self,
        number: VersionNumber,
        closed_at: u64,
        partition_infos: Vec<PartitionInfo>,
    ) -> Result<(), GraphError> {
        let name = self.name.clone();
        let version = self.version_mut(number)?;
        if version.is_closed() {
            return Err(GraphError::VersionClosed {
                domain: name,
                version: number,
            });
        }
        version.closed_at = Some(closed_at);
        version.partition_infos = partition_infos;
        Ok(())
    }

    /// Abandons an open version. Closed versions cannot be cancelled.
    pub fn cancel_version(&mut self, number: VersionNumber) -> Result<DomainVersion, GraphError> {
        if self.require_version(number)?.is_closed() {
            return Err(GraphError::VersionClosed {
                domain: self.name.clone(),
                version: number,
            });
        }
        self.remove_version(number)
    }

    pub fn set_defunct(&mut self, number: VersionNumber, defunct: bool) -> Result<(), GraphError> {
        self.version_mut(number)?.defunct = defunct;
        Ok(())
    }

    /// Removes a version's metadata entirely.
    pub fn remove_version(&mut self, number: VersionNumber) -> Result<DomainVersion, GraphError> {
        self.versions
            .remove(&number)
            .ok_or_else(|| GraphError::UnknownVersion {
                domain: self.name.clone(),
                version: number,
            })
    }

    fn version_mut(&mut self, number: VersionNumber) -> Result<&mut DomainVersion, GraphError> {
        let name = &self.name;
        self.versions
            .get_mut(&number)
            .ok_or_else(|| GraphError::UnknownVersion {
                domain: name.clone(),
                version: number,
            })
    }
}

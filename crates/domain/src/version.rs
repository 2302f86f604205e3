/// A single version of a domain and its properties.
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifies a version within its domain. Numbers ascend in creation order.
pub type VersionNumber = u32;

/// Milliseconds since the Unix epoch, used for `closed_at` stamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What kind of version this is: a full snapshot or a change against a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VersionProperties {
    /// A self-contained snapshot with no parent.
    Base {
        /// Free-text provenance (e.g. the build job that produced it).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// A change set that must be applied on top of `parent`.
    Delta {
        /// Version number of the parent (a base or another delta).
        parent: VersionNumber,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl VersionProperties {
    pub fn base() -> Self {
        Self::Base { source: None }
    }

    pub fn delta(parent: VersionNumber) -> Self {
        Self::Delta {
            parent,
            source: None,
        }
    }

    /// Returns a copy of these properties carrying the given provenance string.
    #[must_use]
    pub fn with_source(self, source: impl Into<String>) -> Self {
        let source = Some(source.into());
        match self {
            Self::Base { .. } => Self::Base { source },
            Self::Delta { parent, .. } => Self::Delta { parent, source },
        }
    }

    /// The parent version number, or `None` for a base.
    #[must_use]
    pub fn parent(&self) -> Option<VersionNumber> {
        match self {
            Self::Base { .. } => None,
            Self::Delta { parent, .. } => Some(*parent),
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Base { source } | Self::Delta { source, .. } => source.as_deref(),
        }
    }

    #[must_use]
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base { .. })
    }
}

/// Size of one partition's data within a closed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition: u32,
    pub num_bytes: u64,
    pub num_records: u64,
}

/// One immutable version of a domain.
///
/// A version is created **open** (still being built), becomes **closed** once
/// its data is frozen, and is eventually marked **defunct** when garbage
/// collection purges its remote data. Defunct versions keep their metadata so
/// that parent pointers through them remain resolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainVersion {
    pub number: VersionNumber,
    pub properties: VersionProperties,
    /// Close time in milliseconds since the epoch; `None` while open.
    #[serde(default)]
    pub closed_at: Option<u64>,
    #[serde(default)]
    pub defunct: bool,
    #[serde(default)]
    pub partition_infos: Vec<PartitionInfo>,
}

impl DomainVersion {
    /// Creates a new open, non-defunct version.
    pub fn open(number: VersionNumber, properties: VersionProperties) -> Self {
        Self {
            number,
            properties,
            closed_at: None,
            defunct: false,
            partition_infos: Vec::new(),
        }
    }

    /// Creates a version that is already closed at `closed_at`.
    pub fn closed(number: VersionNumber, properties: VersionProperties, closed_at: u64) -> Self {
        Self {
            closed_at: Some(closed_at),
            ..Self::open(number, properties)
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    #[must_use]
    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    #[must_use]
    pub fn parent(&self) -> Option<VersionNumber> {
        self.properties.parent()
    }

    #[must_use]
    pub fn is_base(&self) -> bool {
        self.properties.is_base()
    }

    /// Sum of `num_bytes` across all partitions.
    #[must_use]
    pub fn total_num_bytes(&self) -> u64 {
        self.partition_infos.iter().map(|p| p.num_bytes).sum()
    }

    /// Sum of `num_records` across all partitions.
    #[must_use]
    pub fn total_num_records(&self) -> u64 {
        self.partition_infos.iter().map(|p| p.num_records).sum()
    }

    /// Short label used in logs and CLI output, e.g. `v3(delta<-v2)`.
    #[must_use]
    pub fn label(&self) -> String {
        match self.properties.parent() {
            None => format!("v{}(base)", self.number),
            Some(p) => format!("v{}(delta<-v{})", self.number, p),
        }
    }
}

use thiserror::Error;

use crate::VersionNumber;

/// Errors raised when a version graph is inconsistent or used incorrectly.
///
/// These are never transient: retrying the same call against the same graph
/// fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("domain '{0}' does not exist")]
    UnknownDomain(String),

    #[error("domain '{0}' already exists")]
    DomainExists(String),

    #[error("domain '{domain}' has no version {version}")]
    UnknownVersion {
        domain: String,
        version: VersionNumber,
    },

    /// A delta points at a parent that is not present in the domain.
    #[error("version {version} of domain '{domain}' references missing parent {parent}")]
    UnknownParent {
        domain: String,
        version: VersionNumber,
        parent: VersionNumber,
    },

    /// A delta points at a parent that is not strictly older than itself.
    #[error("version {version} of domain '{domain}' has parent {parent} which is not older")]
    ParentNotOlder {
        domain: String,
        version: VersionNumber,
        parent: VersionNumber,
    },

    /// A version required as an update source or target is still being built.
    #[error("version {version} of domain '{domain}' is still open")]
    OpenVersion {
        domain: String,
        version: VersionNumber,
    },

    #[error("version {version} of domain '{domain}' is already closed")]
    VersionClosed {
        domain: String,
        version: VersionNumber,
    },

    /// The ancestry walk ended on a version that is neither a base, a cached
    /// base, nor the current version.
    #[error("no valid base for version {target} of domain '{domain}' (walk ended at {reached})")]
    NoValidBase {
        domain: String,
        target: VersionNumber,
        reached: VersionNumber,
    },

    #[error("domain '{domain}' has {num_partitions} partitions, no partition {partition}")]
    InvalidPartition {
        domain: String,
        partition: u32,
        num_partitions: u32,
    },
}

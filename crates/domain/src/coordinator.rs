/// The metadata coordinator: the authoritative store of every domain's version graph.
use anyhow::{anyhow, ensure, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::{now_millis, Domain, GraphError, PartitionInfo, VersionNumber, VersionProperties};

/// Read/write access to domain version graphs.
///
/// Readers take a [`Domain`] snapshot and work against it; writers go through
/// the mutation methods, each of which is applied atomically to a single
/// domain. Implementations must be shareable across threads.
pub trait Coordinator: Send + Sync {
    /// Returns a snapshot of the named domain.
    fn domain(&self, name: &str) -> Result<Domain>;

    /// Names of all known domains, sorted.
    fn domain_names(&self) -> Result<Vec<String>>;

    fn create_domain(&self, name: &str, num_partitions: u32) -> Result<Domain>;

    /// Records a new open version and returns its number.
    fn open_version(&self, domain: &str, properties: VersionProperties) -> Result<VersionNumber>;

    /// Freezes an open version so it becomes usable as an update source.
    fn close_version(
        &self,
        domain: &str,
        version: VersionNumber,
        partition_infos: Vec<PartitionInfo>,
    ) -> Result<()>;

    /// Abandons an open version.
    fn cancel_version(&self, domain: &str, version: VersionNumber) -> Result<()>;

    fn set_defunct(&self, domain: &str, version: VersionNumber, defunct: bool) -> Result<()>;

    /// Removes a version's metadata entirely.
    fn delete_version(&self, domain: &str, version: VersionNumber) -> Result<()>;

    /// Releases the handle. Calls made after `close` fail.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Coordinator that keeps every domain in memory. Used by tests and tools.
#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    domains: RwLock<BTreeMap<String, Domain>>,
    closed: AtomicBool,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a coordinator pre-populated with the given domains.
    pub fn with_domains(domains: impl IntoIterator<Item = Domain>) -> Self {
        let map = domains
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        Self {
            domains: RwLock::new(map),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.is_closed(), "coordinator has been closed");
        Ok(())
    }

    fn modify<T>(&self, name: &str, f: impl FnOnce(&mut Domain) -> Result<T, GraphError>) -> Result<T> {
        self.ensure_open()?;
        let mut domains = self
            .domains
            .write()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        let domain = domains
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownDomain(name.to_string()))?;
        Ok(f(domain)?)
    }
}

impl Coordinator for MemoryCoordinator {
    fn domain(&self, name: &str) -> Result<Domain> {
        self.ensure_open()?;
        let domains = self
            .domains
            .read()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        domains
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownDomain(name.to_string()).into())
    }

    fn domain_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let domains = self
            .domains
            .read()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        Ok(domains.keys().cloned().collect())
    }

    fn create_domain(&self, name: &str, num_partitions: u32) -> Result<Domain> {
        self.ensure_open()?;
        ensure!(num_partitions > 0, "a domain needs at least one partition");
        let mut domains = self
            .domains
            .write()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        if domains.contains_key(name) {
            return Err(GraphError::DomainExists(name.to_string()).into());
        }
        let domain = Domain::new(name, num_partitions);
        domains.insert(name.to_string(), domain.clone());
        Ok(domain)
    }

    fn open_version(&self, domain: &str, properties: VersionProperties) -> Result<VersionNumber> {
        self.modify(domain, |d| d.open_version(properties))
    }

    fn close_version(
        &self,
        domain: &str,
        version: VersionNumber,
        partition_infos: Vec<PartitionInfo>,
    ) -> Result<()> {
        self.modify(domain, |d| d.close_version(version, now_millis(), partition_infos))
    }

    fn cancel_version(&self, domain: &str, version: VersionNumber) -> Result<()> {
        self.modify(domain, |d| d.cancel_version(version).map(|_| ()))
    }

    fn set_defunct(&self, domain: &str, version: VersionNumber, defunct: bool) -> Result<()> {
        self.modify(domain, |d| d.set_defunct(version, defunct))
    }

    fn delete_version(&self, domain: &str, version: VersionNumber) -> Result<()> {
        self.modify(domain, |d| d.remove_version(version).map(|_| ()))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

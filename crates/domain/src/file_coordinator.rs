/// # File Coordinator - Persistent Domain Metadata
///
/// Stores each domain's version graph as one JSON document:
///
/// ```text
/// <metadata_dir>/
///   clicks.json
///   users.json
/// ```
///
/// ## Crash Safety
///
/// Every mutation rewrites the whole document atomically: write
/// `<domain>.json.tmp`, fsync, then rename over `<domain>.json`. A crash
/// leaves either the old or the new document, never a torn one. Leftover
/// `.tmp` files are ignored on read and overwritten on the next write.
///
/// Mutations are serialized by an in-process mutex; the coordinator assumes it
/// is the only process writing to the directory.
use anyhow::{anyhow, ensure, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::{
    now_millis, Coordinator, Domain, GraphError, PartitionInfo, VersionNumber, VersionProperties,
};

const DOMAIN_EXTENSION: &str = "json";

pub struct FileCoordinator {
    dir: PathBuf,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for FileCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCoordinator")
            .field("dir", &self.dir)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl FileCoordinator {
    /// Opens (creating if needed) a metadata directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create metadata dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(
            !self.closed.load(Ordering::SeqCst),
            "coordinator has been closed"
        );
        Ok(())
    }

    fn domain_path(&self, name: &str) -> Result<PathBuf> {
        ensure!(
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "invalid domain name '{}' (allowed: ASCII letters, digits, '_' and '-')",
            name
        );
        Ok(self.dir.join(format!("{}.{}", name, DOMAIN_EXTENSION)))
    }

    fn load(&self, name: &str) -> Result<Domain> {
        let path = self.domain_path(name)?;
        if !path.exists() {
            return Err(GraphError::UnknownDomain(name.to_string()).into());
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open domain metadata {}", path.display()))?;
        let domain: Domain = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse domain metadata {}", path.display()))?;
        ensure!(
            domain.name() == name,
            "metadata file {} describes domain '{}'",
            path.display(),
            domain.name()
        );
        domain.validate()?;
        Ok(domain)
    }

    fn save(&self, domain: &Domain) -> Result<()> {
        let path = self.domain_path(domain.name())?;
        let tmp_path = path.with_extension("json.tmp");
        {
            let f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, domain)?;
            w.write_all(b"\n")?;
            let f = w.into_inner().map_err(|e| e.into_error())?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    fn modify<T>(&self, name: &str, f: impl FnOnce(&mut Domain) -> Result<T, GraphError>) -> Result<T> {
        self.ensure_open()?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        let mut domain = self.load(name)?;
        let out = f(&mut domain)?;
        self.save(&domain)?;
        Ok(out)
    }
}

impl Coordinator for FileCoordinator {
    fn domain(&self, name: &str) -> Result<Domain> {
        self.ensure_open()?;
        self.load(name)
    }

    fn domain_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == DOMAIN_EXTENSION).unwrap_or(false))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_domain(&self, name: &str, num_partitions: u32) -> Result<Domain> {
        self.ensure_open()?;
        ensure!(num_partitions > 0, "a domain needs at least one partition");
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("coordinator lock poisoned"))?;
        if self.domain_path(name)?.exists() {
            return Err(GraphError::DomainExists(name.to_string()).into());
        }
        let domain = Domain::new(name, num_partitions);
        self.save(&domain)?;
        tracing::info!(domain = name, num_partitions, "created domain");
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

//! # Config - Environment Settings
//!
//! Every setting comes from an environment variable with a default:
//!
//! ```text
//! VERSA_DATA_DIR         local partition roots        (default: "data/partitions")
//! VERSA_REMOTE_DIR       remote version store         (default: "data/remote")
//! VERSA_METADATA_DIR     domain graph documents       (default: "data/metadata")
//! VERSA_KEEP_VERSIONS    cleaner retention N          (default: 3, 0 = disabled)
//! VERSA_CACHE_BASES      cached bases per partition   (default: 1)
//! VERSA_DELETE_METADATA  cleaner deletes metadata too (default: "false")
//! ```
//!
//! A value that does not parse is an error rather than a silent default.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DATA_DIR_VAR: &str = "VERSA_DATA_DIR";
pub const REMOTE_DIR_VAR: &str = "VERSA_REMOTE_DIR";
pub const METADATA_DIR_VAR: &str = "VERSA_METADATA_DIR";
pub const KEEP_VERSIONS_VAR: &str = "VERSA_KEEP_VERSIONS";
pub const CACHE_BASES_VAR: &str = "VERSA_CACHE_BASES";
pub const DELETE_METADATA_VAR: &str = "VERSA_DELETE_METADATA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub remote_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub keep_versions: usize,
    pub cache_bases: usize,
    pub delete_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/partitions"),
            remote_dir: PathBuf::from("data/remote"),
            metadata_dir: PathBuf::from("data/metadata"),
            keep_versions: 3,
            cache_bases: 1,
            delete_metadata: false,
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            data_dir: lookup(DATA_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.data_dir),
            remote_dir: lookup(REMOTE_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.remote_dir),
            metadata_dir: lookup(METADATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_dir),
            keep_versions: parsed(&lookup, KEEP_VERSIONS_VAR, defaults.keep_versions)?,
            cache_bases: parsed(&lookup, CACHE_BASES_VAR, defaults.cache_bases)?,
            delete_metadata: parsed(&lookup, DELETE_METADATA_VAR, defaults.delete_metadata)?,
        })
    }

    /// `<data_dir>/<domain>/<partition>`
    #[must_use]
    pub fn partition_root(&self, domain: &str, partition: u32) -> PathBuf {
        self.data_dir.join(domain).join(partition.to_string())
    }

    #[must_use]
    pub fn remote_dir(&self) -> &Path {
        &self.remote_dir
    }

    #[must_use]
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {:?} for {}", raw, key)),
    }
}

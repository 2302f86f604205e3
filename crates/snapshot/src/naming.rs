use anyhow::{Context, Result};
use domain::{DomainVersion, VersionNumber};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Whether a file holds a full state or a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionKind {
    Base,
    Delta,
}

impl VersionKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Delta => "delta",
        }
    }

    /// The kind a version's remote file has.
    #[must_use]
    pub fn of(version: &DomainVersion) -> Self {
        if version.is_base() {
            Self::Base
        } else {
            Self::Delta
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::Delta => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Base),
            1 => Some(Self::Delta),
            _ => None,
        }
    }
}

/// `0000000042.base`
#[must_use]
pub fn file_name(version: VersionNumber, kind: VersionKind) -> String {
    format!("{:010}.{}", version, kind.extension())
}

/// Inverse of [`file_name`]. Anything else (including `.tmp` files) yields `None`.
#[must_use]
pub fn parse_file_name(name: &str) -> Option<(VersionNumber, VersionKind)> {
    let (stem, ext) = name.split_once('.')?;
    let kind = match ext {
        "base" => VersionKind::Base,
        "delta" => VersionKind::Delta,
        _ => return None,
    };
    if stem.len() != 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = stem.parse().ok()?;
    Some((version, kind))
}

/// Version numbers of all `kind` files directly inside `dir`.
///
/// A missing directory is treated as empty.
pub fn scan_versions(dir: &Path, kind: VersionKind) -> Result<BTreeSet<VersionNumber>> {
    let mut found = BTreeSet::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some((version, k)) = parse_file_name(name) {
            if k == kind {
                found.insert(version);
            }
        }
    }
    Ok(found)
}

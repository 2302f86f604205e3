use crate::workspace::CACHE_DIR;
use crate::*;
use anyhow::{bail, Context, Result};
use domain::{Domain, DomainVersion, VersionNumber, VersionProperties};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Builds a domain from `(number, parent)` pairs, all closed.
pub fn domain_of(versions: &[(VersionNumber, Option<VersionNumber>)]) -> Domain {
    let mut d = Domain::new("test", 1);
    for &(n, parent) in versions {
        let props = match parent {
            None => VersionProperties::base(),
            Some(p) => VersionProperties::delta(p),
        };
        d.insert_version(DomainVersion::closed(n, props, 1000 + n as u64))
            .unwrap();
    }
    d
}

pub fn v(d: &Domain, n: VersionNumber) -> DomainVersion {
    d.require_version(n).unwrap().clone()
}

pub fn numbers(list: &[VersionNumber]) -> BTreeSet<VersionNumber> {
    list.iter().copied().collect()
}

/// A format whose version files are small text files.
///
/// - remote data: `remote[n]` is the text of version `n`
/// - files: `<n>.base` / `<n>.delta` in `cache/`, a single `<n>.base` at the root
/// - applying a plan writes `<target>.base` whose content is the applied
///   texts joined with `+`
pub struct FakeFormat {
    pub root: PathBuf,
    pub remote: BTreeMap<VersionNumber, String>,
    pub kinds: BTreeMap<VersionNumber, bool>,
    pub fetched: RefCell<Vec<VersionNumber>>,
    pub fail_fetch_of: Option<VersionNumber>,
    pub fail_core: bool,
    pub clean_calls: RefCell<usize>,
}

impl FakeFormat {
    pub fn new(root: &Path, domain: &Domain) -> Self {
        let mut remote = BTreeMap::new();
        let mut kinds = BTreeMap::new();
        for ver in domain.versions() {
            remote.insert(ver.number, format!("d{}", ver.number));
            kinds.insert(ver.number, ver.is_base());
        }
        Self {
            root: root.to_path_buf(),
            remote,
            kinds,
            fetched: RefCell::new(Vec::new()),
            fail_fetch_of: None,
            fail_core: false,
            clean_calls: RefCell::new(0),
        }
    }

    pub fn cache(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    fn scan(dir: &Path, ext: &str) -> Result<BTreeSet<VersionNumber>> {
        let mut out = BTreeSet::new();
        if !dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == ext).unwrap_or(false) {
                if let Some(n) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
                    out.insert(n);
                }
            }
        }
        Ok(out)
    }

    fn file_name(&self, n: VersionNumber) -> String {
        if self.kinds.get(&n).copied().unwrap_or(true) {
            format!("{}.base", n)
        } else {
            format!("{}.delta", n)
        }
    }

    /// Text served from the partition root.
    pub fn current_text(&self) -> Option<String> {
        let n = Self::scan(&self.root, "base").ok()?.into_iter().next()?;
        fs::read_to_string(self.root.join(format!("{}.base", n))).ok()
    }
}

impl PartitionFormat for FakeFormat {
    fn root(&self) -> &Path {
        &self.root
    }

    fn detect_current_version_number(&self) -> Result<Option<VersionNumber>> {
        let found = Self::scan(&self.root, "base")?;
        if found.len() > 1 {
            bail!("several current versions: {:?}", found);
        }
        Ok(found.into_iter().next())
    }

    fn detect_cached_bases_core(&self) -> Result<BTreeSet<VersionNumber>> {
        Self::scan(&self.cache(), "base")
    }

    fn detect_cached_deltas_core(&self) -> Result<BTreeSet<VersionNumber>> {
        Self::scan(&self.cache(), "delta")
    }

    fn clean_cached_versions(&self, _domain: &Domain) -> Result<()> {
        *self.clean_calls.borrow_mut() += 1;
        Ok(())
    }

    fn fetch_version(&self, version: &DomainVersion, dest_root: &Path) -> Result<()> {
        if self.fail_fetch_of == Some(version.number) {
            bail!("remote unavailable for v{}", version.number);
        }
        let text = self.remote.get(&version.number).context("no remote data")?;
        fs::write(dest_root.join(self.file_name(version.number)), text)?;
        self.fetched.borrow_mut().push(version.number);
        Ok(())
    }

    fn run_update_core(
        &self,
        current: Option<&DomainVersion>,
        target: &DomainVersion,
        plan: &UpdatePlan,
        work_root: &Path,
        _stats: &mut UpdateStatistics,
    ) -> Result<()> {
        if self.fail_core {
            bail!("merge failed");
        }
        let base_path = if current.map(|c| c.number) == Some(plan.base.number) {
            self.root.join(format!("{}.base", plan.base.number))
        } else {
            self.cache().join(format!("{}.base", plan.base.number))
        };
        let mut text = fs::read_to_string(&base_path)
            .with_context(|| format!("missing base {}", base_path.display()))?;
        for delta in &plan.deltas {
            let path = self.cache().join(format!("{}.delta", delta.number));
            text.push('+');
            text.push_str(&fs::read_to_string(&path).with_context(|| format!("missing delta {}", path.display()))?);
        }
        fs::write(work_root.join(format!("{}.base", target.number)), text)?;
        Ok(())
    }
}

/// Directory names in `root` starting with `prefix`.
pub fn dirs_with_prefix(root: &Path, prefix: &str) -> Vec<String> {
    fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.starts_with(prefix))
        .collect()
}

use crate::*;
use anyhow::Result;
use domain::{Domain, DomainVersion, VersionNumber, VersionProperties};
use std::collections::BTreeMap;
use std::path::Path;

pub const DOMAIN: &str = "clicks";

pub fn put(k: &str, v: &str) -> Record {
    Record::put(k.as_bytes(), v.as_bytes())
}

pub fn del(k: &str) -> Record {
    Record::del(k.as_bytes())
}

pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

/// Publishes one version of partition 0 and records it, closed, in `domain`.
pub fn publish(
    store: &LocalRemoteStore,
    domain: &mut Domain,
    number: VersionNumber,
    parent: Option<VersionNumber>,
    records: Vec<Record>,
) -> Result<()> {
    let (props, kind) = match parent {
        None => (VersionProperties::base(), VersionKind::Base),
        Some(p) => (VersionProperties::delta(p), VersionKind::Delta),
    };
    let info = store.publish(DOMAIN, 0, number, kind, records)?;
    let mut version = DomainVersion::closed(number, props, 1_000 + u64::from(number));
    version.partition_infos = vec![info];
    domain.insert_version(version)?;
    Ok(())
}

/// Remote history used by most partition tests:
///
/// ```text
/// v0 {a=1, b=2} <- v1 {b=20, c=3} <- v2 {-a}
/// v3 {z=9}
/// ```
pub fn standard_history(remote_root: &Path) -> Result<(LocalRemoteStore, Domain)> {
    let store = LocalRemoteStore::new(remote_root);
    let mut d = Domain::new(DOMAIN, 1);
    publish(&store, &mut d, 0, None, vec![put("a", "1"), put("b", "2")])?;
    publish(&store, &mut d, 1, Some(0), vec![put("b", "20"), put("c", "3")])?;
    publish(&store, &mut d, 2, Some(1), vec![del("a")])?;
    publish(&store, &mut d, 3, None, vec![put("z", "9")])?;
    Ok((store, d))
}

/// Names of the version files in `dir`, sorted.
pub fn version_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .filter(|n| parse_file_name(n).is_some())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

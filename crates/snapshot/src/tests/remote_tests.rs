use super::helpers::*;
use crate::*;
use anyhow::Result;
use cleaner::{RemoteDomainCleaner, RemoteDomainVersionDeleter};
use domain::{Coordinator, Domain, DomainVersion, MemoryCoordinator, VersionProperties};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn publish_reports_partition_sizes() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalRemoteStore::new(dir.path());
    let info = store.publish(DOMAIN, 3, 7, VersionKind::Delta, vec![put("a", "1"), del("b")])?;

    let path = store.file_path(DOMAIN, 3, 7, VersionKind::Delta);
    assert_eq!(path, dir.path().join(DOMAIN).join("3").join("0000000007.delta"));
    assert_eq!(info.partition, 3);
    assert_eq!(info.num_records, 2);
    assert_eq!(info.num_bytes, std::fs::metadata(&path)?.len());
    Ok(())
}

#[test]
fn fetch_copies_the_file_matching_the_version_kind() -> Result<()> {
    let dir = tempdir()?;
    let (store, d) = standard_history(&dir.path().join("remote"))?;
    let dest = dir.path().join("dest");
    std::fs::create_dir_all(&dest)?;

    let base = store.fetch(DOMAIN, 0, d.require_version(0)?, &dest)?;
    let delta = store.fetch(DOMAIN, 0, d.require_version(1)?, &dest)?;
    assert_eq!(base, dest.join("0000000000.base"));
    assert_eq!(delta, dest.join("0000000001.delta"));
    assert_eq!(SnapshotReader::load(&base)?, map(&[("a", "1"), ("b", "2")]));
    Ok(())
}

#[test]
fn fetch_of_missing_version_fails() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalRemoteStore::new(dir.path().join("remote"));
    let version = DomainVersion::closed(5, VersionProperties::base(), 0);
    assert!(store.fetch(DOMAIN, 0, &version, dir.path()).is_err());
    Ok(())
}

#[test]
fn deleter_removes_version_from_every_partition() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalRemoteStore::new(dir.path());
    for partition in 0..3 {
        store.publish(DOMAIN, partition, 0, VersionKind::Base, vec![put("a", "1")])?;
        store.publish(DOMAIN, partition, 1, VersionKind::Delta, vec![put("a", "2")])?;
    }

    let deleter = store.deleter(DOMAIN, 3);
    deleter.delete_version(0)?;
    // second delete of the same version is a no-op
    deleter.delete_version(0)?;

    for partition in 0..3 {
        assert!(!store.file_path(DOMAIN, partition, 0, VersionKind::Base).exists());
        assert!(store.file_path(DOMAIN, partition, 1, VersionKind::Delta).exists());
    }
    Ok(())
}

#[test]
fn cleaner_purges_remote_files_outside_retention() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalRemoteStore::new(dir.path());
    let mut d = Domain::new(DOMAIN, 2);
    let history: [(u32, Option<u32>); 4] = [(0, None), (1, Some(0)), (2, Some(1)), (3, None)];
    for (n, parent) in history {
        let (props, kind) = match parent {
            None => (VersionProperties::base(), VersionKind::Base),
            Some(p) => (VersionProperties::delta(p), VersionKind::Delta),
        };
        let infos = (0..2)
            .map(|p| store.publish(DOMAIN, p, n, kind, vec![put("k", "v")]))
            .collect::<Result<Vec<_>>>()?;
        let mut version = DomainVersion::closed(n, props, 0);
        version.partition_infos = infos;
        d.insert_version(version)?;
    }

    let coordinator = Arc::new(MemoryCoordinator::with_domains([d]));
    let cleaner = RemoteDomainCleaner::new(coordinator.clone(), DOMAIN, 1);
    let report = cleaner.delete_old_versions(&store.deleter(DOMAIN, 2), false)?;
    assert_eq!(report.kept, vec![3]);
    assert_eq!(report.deleted, vec![2, 1, 0]);

    for p in 0..2 {
        assert!(store.file_path(DOMAIN, p, 3, VersionKind::Base).exists());
        assert!(!store.file_path(DOMAIN, p, 0, VersionKind::Base).exists());
        assert!(!store.file_path(DOMAIN, p, 1, VersionKind::Delta).exists());
        assert!(!store.file_path(DOMAIN, p, 2, VersionKind::Delta).exists());
    }
    let after = coordinator.domain(DOMAIN)?;
    assert!(after.require_version(1)?.is_defunct());
    assert!(!after.require_version(3)?.is_defunct());
    Ok(())
}

#[test]
fn oversized_key_is_refused_at_publish() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalRemoteStore::new(dir.path());
    let key = vec![b'k'; MAX_KEY_BYTES + 1];
    assert!(store.publish(DOMAIN, 0, 0, VersionKind::Base, vec![Record::put(key, "v")]).is_err());
    assert!(!store.file_path(DOMAIN, 0, 0, VersionKind::Base).exists());
    Ok(())
}

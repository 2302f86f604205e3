/// Command dispatch for the interactive shell.
///
/// Each line of input is one command. [`Shell::execute`] returns the lines to
/// print; the REPL in `main.rs` only handles I/O.
use anyhow::{anyhow, bail, Context, Result};
use cleaner::RemoteDomainCleaner;
use config::Config;
use domain::{Coordinator, Domain, FileCoordinator, PartitionInfo, VersionNumber, VersionProperties};
use snapshot::{LocalRemoteStore, Record, SnapshotPartition, VersionKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use updater::{PartitionUpdater, UpdateStatistics};

pub const USAGE: &[&str] = &[
    "Commands: CREATE domain partitions | BASE domain k=v... | DELTA domain parent k=v|-k...",
    "          VERSIONS domain | PLAN domain partition version | UPDATE domain partition version",
    "          GET domain partition key | CLEAN domain | EXIT",
];

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Exit,
}

impl Reply {
    fn line(s: impl Into<String>) -> Self {
        Self::Lines(vec![s.into()])
    }
}

/// Partition a key is stored in.
#[must_use]
pub fn partition_for(key: &[u8], num_partitions: u32) -> u32 {
    crc32fast::hash(key) % num_partitions.max(1)
}

pub struct Shell {
    config: Config,
    coordinator: Arc<dyn Coordinator>,
    remote: LocalRemoteStore,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell").field("config", &self.config).finish()
    }
}

impl Shell {
    pub fn open(config: Config) -> Result<Self> {
        let coordinator = FileCoordinator::open(config.metadata_dir())?;
        let remote = LocalRemoteStore::new(config.remote_dir());
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
            remote,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one input line. Blank lines produce no output.
    ///
    /// # Errors
    ///
    /// Usage errors and every failure of the underlying operation.
    pub fn execute(&mut self, line: &str) -> Result<Reply> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Reply::Lines(Vec::new()));
        };
        let args: Vec<&str> = parts.collect();
        match cmd.to_uppercase().as_str() {
            "CREATE" => self.create(&args),
            "BASE" => self.base(&args),
            "DELTA" => self.delta(&args),
            "VERSIONS" => self.versions(&args),
            "PLAN" => self.plan(&args),
            "UPDATE" => self.update(&args),
            "GET" => self.get(&args),
            "CLEAN" => self.clean(&args),
            "HELP" => Ok(Reply::Lines(USAGE.iter().map(|s| s.to_string()).collect())),
            "EXIT" | "QUIT" => Ok(Reply::Exit),
            other => bail!("unknown command: {}", other),
        }
    }

    fn create(&self, args: &[&str]) -> Result<Reply> {
        let [name, partitions] = args else {
            bail!("usage: CREATE domain partitions");
        };
        let partitions: u32 = parse_arg(partitions, "partitions")?;
        if partitions == 0 {
            bail!("a domain needs at least one partition");
        }
        self.coordinator.create_domain(name, partitions)?;
        Ok(Reply::line(format!("OK ({} partitions)", partitions)))
    }

    fn base(&self, args: &[&str]) -> Result<Reply> {
        let Some((name, assignments)) = args.split_first() else {
            bail!("usage: BASE domain k=v...");
        };
        let records = parse_records(assignments, false)?;
        let number = self.build_version(name, VersionProperties::base(), VersionKind::Base, records)?;
        Ok(Reply::line(format!("OK v{}", number)))
    }

    fn delta(&self, args: &[&str]) -> Result<Reply> {
        let [name, parent, assignments @ ..] = args else {
            bail!("usage: DELTA domain parent k=v|-k...");
        };
        let parent: VersionNumber = parse_arg(parent, "parent")?;
        let records = parse_records(assignments, true)?;
        let number = self.build_version(name, VersionProperties::delta(parent), VersionKind::Delta, records)?;
        Ok(Reply::line(format!("OK v{}", number)))
    }

    /// Opens a version, publishes every partition's share, then closes it.
    /// A failed publish cancels the version.
    fn build_version(
        &self,
        name: &str,
        properties: VersionProperties,
        kind: VersionKind,
        records: Vec<Record>,
    ) -> Result<VersionNumber> {
        let domain = self.coordinator.domain(name)?;
        let number = self.coordinator.open_version(name, properties)?;

        match self.publish_all(&domain, number, kind, records) {
            Ok(infos) => {
                self.coordinator.close_version(name, number, infos)?;
                tracing::info!(domain = name, version = number, "closed version");
                Ok(number)
            }
            Err(e) => {
                if let Err(cancel_err) = self.coordinator.cancel_version(name, number) {
                    tracing::error!(domain = name, version = number, error = %cancel_err, "failed to cancel version");
                }
                Err(e)
            }
        }
    }

    fn publish_all(
        &self,
        domain: &Domain,
        number: VersionNumber,
        kind: VersionKind,
        records: Vec<Record>,
    ) -> Result<Vec<PartitionInfo>> {
        let num_partitions = domain.num_partitions();
        let mut routed: BTreeMap<u32, Vec<Record>> = (0..num_partitions).map(|p| (p, Vec::new())).collect();
        for record in records {
            let partition = partition_for(record.key(), num_partitions);
            routed.entry(partition).or_default().push(record);
        }
        routed
            .into_iter()
            .map(|(partition, records)| {
                self.remote
                    .publish(domain.name(), partition, number, kind, records)
            })
            .collect()
    }

    fn versions(&self, args: &[&str]) -> Result<Reply> {
        let [name] = args else {
            bail!("usage: VERSIONS domain");
        };
        let domain = self.coordinator.domain(name)?;
        if domain.is_empty() {
            return Ok(Reply::line("(no versions)"));
        }
        let lines = domain
            .versions()
            .map(|v| {
                let state = if v.is_defunct() {
                    "defunct"
                } else if v.is_closed() {
                    "closed"
                } else {
                    "open"
                };
                format!(
                    "{} {} records={} bytes={}",
                    v.label(),
                    state,
                    v.total_num_records(),
                    v.total_num_bytes()
                )
            })
            .collect();
        Ok(Reply::Lines(lines))
    }

    fn partition_updater(&self, name: &str, partition: &str) -> Result<PartitionUpdater<SnapshotPartition>> {
        let domain = self.coordinator.domain(name)?;
        let partition: u32 = parse_arg(partition, "partition")?;
        domain.check_partition(partition)?;
        let format = SnapshotPartition::new(
            self.config.partition_root(name, partition),
            self.remote.clone(),
            name,
            partition,
            self.config.cache_bases,
        );
        Ok(PartitionUpdater::new(domain, format))
    }

    fn plan(&self, args: &[&str]) -> Result<Reply> {
        let [name, partition, version] = args else {
            bail!("usage: PLAN domain partition version");
        };
        let updater = self.partition_updater(name, partition)?;
        let version: VersionNumber = parse_arg(version, "version")?;
        match updater.plan(version)? {
            Some(plan) => Ok(Reply::line(plan.to_string())),
            None => Ok(Reply::line("(up to date)")),
        }
    }

    fn update(&self, args: &[&str]) -> Result<Reply> {
        let [name, partition, version] = args else {
            bail!("usage: UPDATE domain partition version");
        };
        let mut updater = self.partition_updater(name, partition)?;
        let version: VersionNumber = parse_arg(version, "version")?;
        let target = updater.domain().require_version(version)?.clone();

        let mut stats = UpdateStatistics::new();
        updater.update_to(&target, &mut stats)?;

        if stats.is_empty() {
            return Ok(Reply::line(format!("OK v{} (up to date)", version)));
        }
        let timings: Vec<String> = stats
            .iter()
            .map(|(phase, elapsed)| format!("{}={}ms", phase, elapsed.as_millis()))
            .collect();
        Ok(Reply::line(format!("OK v{} ({})", version, timings.join(", "))))
    }

    fn get(&self, args: &[&str]) -> Result<Reply> {
        let [name, partition, key] = args else {
            bail!("usage: GET domain partition key");
        };
        let updater = self.partition_updater(name, partition)?;
        match updater.format().get(key.as_bytes())? {
            Some(value) => Ok(Reply::line(String::from_utf8_lossy(&value).into_owned())),
            None => Ok(Reply::line("(nil)")),
        }
    }

    fn clean(&self, args: &[&str]) -> Result<Reply> {
        let [name] = args else {
            bail!("usage: CLEAN domain");
        };
        let domain = self.coordinator.domain(name)?;
        let cleaner = RemoteDomainCleaner::new(self.coordinator.clone(), *name, self.config.keep_versions);
        let deleter = self.remote.deleter(name, domain.num_partitions());
        let report = cleaner.delete_old_versions(&deleter, self.config.delete_metadata)?;
        Ok(Reply::line(format!(
            "OK kept {} deleted {}",
            list(&report.kept),
            list(&report.deleted)
        )))
    }
}

fn parse_arg<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow!("invalid {}: {}", what, raw))
}

/// `k=v` puts; `-k` deletes when allowed.
fn parse_records(assignments: &[&str], allow_deletes: bool) -> Result<Vec<Record>> {
    assignments
        .iter()
        .map(|a| {
            if let Some(key) = a.strip_prefix('-') {
                if !allow_deletes {
                    bail!("deletes are only allowed in deltas: {}", a);
                }
                if key.is_empty() {
                    bail!("empty key in {}", a);
                }
                return Ok(Record::del(key.as_bytes()));
            }
            let (key, value) = a
                .split_once('=')
                .with_context(|| format!("expected k=v, got {}", a))?;
            if key.is_empty() {
                bail!("empty key in {}", a);
            }
            Ok(Record::put(key.as_bytes(), value.as_bytes()))
        })
        .collect()
}

fn list(versions: &[VersionNumber]) -> String {
    let items: Vec<String> = versions.iter().map(|v| format!("v{}", v)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell_in(dir: &std::path::Path) -> Shell {
        let config = Config {
            data_dir: dir.join("partitions"),
            remote_dir: dir.join("remote"),
            metadata_dir: dir.join("metadata"),
            keep_versions: 1,
            cache_bases: 1,
            delete_metadata: false,
        };
        Shell::open(config).unwrap()
    }

    fn run(shell: &mut Shell, line: &str) -> Vec<String> {
        match shell.execute(line).unwrap() {
            Reply::Lines(lines) => lines,
            Reply::Exit => vec!["<exit>".to_string()],
        }
    }

    #[test]
    fn routing_is_stable_and_in_range() {
        for key in [&b"a"[..], b"user:42", b""] {
            let p = partition_for(key, 4);
            assert!(p < 4);
            assert_eq!(p, partition_for(key, 4));
        }
        assert_eq!(partition_for(b"anything", 1), 0);
    }

    #[test]
    fn parse_records_accepts_puts_and_deletes() {
        let records = parse_records(&["a=1", "b=x=y", "-c"], true).unwrap();
        assert_eq!(
            records,
            vec![Record::put("a", "1"), Record::put("b", "x=y"), Record::del("c")]
        );
        assert!(parse_records(&["-c"], false).is_err());
        assert!(parse_records(&["novalue"], true).is_err());
        assert!(parse_records(&["=v"], true).is_err());
    }

    #[test]
    fn build_update_and_read_back() {
        let dir = tempdir().unwrap();
        let mut shell = shell_in(dir.path());

        assert_eq!(run(&mut shell, "CREATE clicks 1"), vec!["OK (1 partitions)"]);
        assert_eq!(run(&mut shell, "BASE clicks a=1 b=2"), vec!["OK v0"]);
        assert_eq!(run(&mut shell, "DELTA clicks 0 b=3 -a"), vec!["OK v1"]);
        assert_eq!(run(&mut shell, "PLAN clicks 0 1"), vec!["base v0 + deltas [v1]"]);

        let out = run(&mut shell, "UPDATE clicks 0 1");
        assert!(out[0].starts_with("OK v1 ("), "{:?}", out);
        assert!(out[0].contains("Update data fetch="));
        assert_eq!(run(&mut shell, "GET clicks 0 b"), vec!["3"]);
        assert_eq!(run(&mut shell, "GET clicks 0 a"), vec!["(nil)"]);
        assert_eq!(run(&mut shell, "PLAN clicks 0 1"), vec!["(up to date)"]);
        assert_eq!(run(&mut shell, "exit"), vec!["<exit>"]);
    }

    #[test]
    fn bad_input_is_an_error() {
        let dir = tempdir().unwrap();
        let mut shell = shell_in(dir.path());
        assert!(shell.execute("CREATE clicks zero").is_err());
        assert!(shell.execute("CREATE clicks 0").is_err());
        assert!(shell.execute("BASE missing a=1").is_err());
        assert!(shell.execute("FROB").is_err());
        run(&mut shell, "CREATE clicks 2");
        assert!(shell.execute("GET clicks 5 a").is_err());
        assert!(shell.execute("BASE clicks -a").is_err());
    }
}

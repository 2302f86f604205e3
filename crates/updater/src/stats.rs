use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Duration key for fetching missing versions and committing them to the cache.
pub const FETCH_PHASE: &str = "Update data fetch";
/// Duration key for applying the plan and promoting the result.
pub const EXECUTION_PHASE: &str = "Update execution";

/// Named durations collected while an update runs.
///
/// The updater records [`FETCH_PHASE`] and [`EXECUTION_PHASE`]; formats may
/// add their own keys from inside `run_update_core`. Recording a key twice
/// keeps the latest value.
#[derive(Debug, Clone, Default)]
pub struct UpdateStatistics {
    durations: BTreeMap<String, Duration>,
}

impl UpdateStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, elapsed: Duration) {
        self.durations.insert(name.into(), elapsed);
    }

    /// Records the time elapsed since `start`.
    pub fn record_since(&mut self, name: impl Into<String>, start: Instant) {
        self.record(name, start.elapsed());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Duration> {
        self.durations.get(name).copied()
    }

    /// The named duration in whole milliseconds.
    #[must_use]
    pub fn millis(&self, name: &str) -> Option<u64> {
        self.get(name).map(|d| d.as_millis() as u64)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// All recorded durations, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.durations.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

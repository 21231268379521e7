//! Client-side call statistics.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Entry cap used when the configured size is below 1.
pub const DEFAULT_MAX_STATS_SIZE: usize = 100_000;

/// Counters for one call identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    /// Total latency in milliseconds.
    pub total_ms: f64,
    /// Slowest call in milliseconds.
    pub max_ms: f64,
}

impl CallStats {
    /// Mean latency in milliseconds.
    pub fn mean_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ms / self.calls as f64
        }
    }
}

/// Bounded map from call identity (`"<method>:<target>"`) to [`CallStats`].
///
/// Once `max_entries` identities are tracked, calls with a new identity are
/// not recorded; known identities keep accumulating.
#[derive(Debug)]
pub struct StatsAggregator {
    max_entries: usize,
    entries: Mutex<HashMap<String, CallStats>>,
}

impl StatsAggregator {
    /// Create an aggregator. `max_entries < 1` selects
    /// [`DEFAULT_MAX_STATS_SIZE`].
    pub fn new(max_entries: i64) -> Self {
        let max_entries = usize::try_from(max_entries)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_MAX_STATS_SIZE);

        Self {
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Record one call.
    pub fn record(&self, call: &str, elapsed: Duration, success: bool) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(call) && entries.len() >= self.max_entries {
            return;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let stats = entries.entry(call.to_string()).or_default();
        stats.calls += 1;
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_ms += elapsed_ms;
        stats.max_ms = stats.max_ms.max(elapsed_ms);
    }

    /// Take a snapshot sorted by call identity and clear the aggregate.
    pub fn read(&self) -> Vec<(String, CallStats)> {
        let drained = std::mem::take(&mut *self.entries.lock());
        let mut snapshot: Vec<_> = drained.into_iter().collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Number of tracked call identities.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Operation profiling for cache stacks.
//!
//! [`CacheProfiler`] keeps a bounded history of [`ProfileEvent`]s plus
//! cumulative [`CacheStats`] that survive history truncation. A lock poisoned
//! by a panicking recorder is recovered, so profiling never stops silently.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// What an operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Hit,
    Miss,
    Write,
    Delete,
    Error,
}

/// A single profiled cache call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEvent {
    pub operation: &'static str,
    pub keys: Vec<String>,
    pub elapsed: Duration,
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub errors: u64,
    /// Time spent inside profiled calls.
    pub total_time: Duration,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of profiled calls.
    pub fn calls(&self) -> u64 {
        self.hits + self.misses + self.writes + self.deletes + self.errors
    }

    fn record(&mut self, outcome: Outcome, elapsed: Duration) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::Miss => self.misses += 1,
            Outcome::Write => self.writes += 1,
            Outcome::Delete => self.deletes += 1,
            Outcome::Error => self.errors += 1,
        }
        self.total_time += elapsed;
    }
}

/// Collects profile events from one or more decorated backends.
#[derive(Debug)]
pub struct CacheProfiler {
    capacity: usize,
    events: RwLock<VecDeque<ProfileEvent>>,
    stats: RwLock<CacheStats>,
}

impl CacheProfiler {
    /// Create a profiler retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, event: ProfileEvent) {
        self.stats
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .record(event.outcome, event.elapsed);

        let mut events = self.events.write().unwrap_or_else(|err| err.into_inner());
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<ProfileEvent> {
        self.events
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().unwrap_or_else(|err| err.into_inner()).clone()
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }

    /// Forget every event and zero the statistics.
    pub fn reset(&self) {
        self.events
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
        *self.stats.write().unwrap_or_else(|err| err.into_inner()) = CacheStats::default();
    }
}

impl Default for CacheProfiler {
    fn default() -> Self {
        Self::new(1000)
    }
}

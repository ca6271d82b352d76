//! Entry lifetimes.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long a cache entry stays readable.
///
/// Serialized as whole seconds, where `0` means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum Lifetime {
    /// Never expires
    #[default]
    Forever,
    /// Expires after the given number of seconds
    Seconds(u64),
}

impl Lifetime {
    /// Build a lifetime from seconds; zero means forever.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Forever
        } else {
            Self::Seconds(secs)
        }
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, Self::Forever)
    }

    /// Get the lifetime as a duration, or None for entries that never expire.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Forever => None,
            Self::Seconds(secs) => Some(Duration::from_secs(*secs)),
        }
    }

    /// Deadline for an entry written at `now`.
    pub fn expires_at(&self, now: Instant) -> Option<Instant> {
        self.as_duration().and_then(|d| now.checked_add(d))
    }

    /// Seconds, with zero standing for forever.
    pub fn as_secs(&self) -> u64 {
        match self {
            Self::Forever => 0,
            Self::Seconds(secs) => *secs,
        }
    }
}

impl From<u64> for Lifetime {
    fn from(secs: u64) -> Self {
        Self::from_secs(secs)
    }
}

impl From<Lifetime> for u64 {
    fn from(lifetime: Lifetime) -> Self {
        lifetime.as_secs()
    }
}

/// Partial seconds round up, so only `Duration::ZERO` means forever.
impl From<Duration> for Lifetime {
    fn from(duration: Duration) -> Self {
        let secs = duration.as_secs();
        if duration.subsec_nanos() > 0 {
            Self::Seconds(secs.saturating_add(1))
        } else {
            Self::from_secs(secs)
        }
    }
}

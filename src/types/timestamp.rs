use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::utils::helper::current_timestamp_secs;

/// Observation time in seconds since the Unix epoch. Zero means "never observed".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(current_timestamp_secs())
    }

    pub fn from_secs(secs: u64) -> Self {
        Timestamp(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Seconds elapsed between `self` and `now`, or `None` for a future-dated reading.
    pub fn age_at(&self, now: Timestamp) -> Option<u64> {
        now.0.checked_sub(self.0)
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(secs))
    }
}

impl std::ops::Add<std::time::Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: std::time::Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration.as_secs()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of "now" for an aggregation call.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock, shared between a test and the aggregator under test.
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            secs: AtomicU64::new(start.as_secs()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.secs.store(at.as_secs(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.secs.load(Ordering::SeqCst))
    }
}

//! Time sources
use chrono::Utc;

use super::trade::TimeStamp;

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

/// Wall clock, UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

/// Always answers with the same instant. Keeps audit timestamps deterministic in tests.
#[derive(Debug, Clone)]
pub struct FixedClock(TimeStamp<Utc>);

impl FixedClock {
    pub fn new(at: TimeStamp<Utc>) -> Self {
        Self(at)
    }
}

impl TimeProvider for FixedClock {
    fn now(&self) -> TimeStamp<Utc> {
        self.0.clone()
    }
}

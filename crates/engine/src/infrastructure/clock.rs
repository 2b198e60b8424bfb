//! Clock implementations.

use chrono::{DateTime, Utc};

use crate::infrastructure::ports::ClockPort;

/// Wall-clock time in UTC. PST formatting happens at the storage boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[cfg(test)]
pub struct FrozenClock(pub DateTime<Utc>);

#[cfg(test)]
impl FrozenClock {
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        use chrono::TimeZone;
        Self(Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap())
    }
}

#[cfg(test)]
impl ClockPort for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

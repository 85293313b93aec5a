//! Wall-clock time source used for heartbeat deadlines and datum stamps.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Seconds/nanoseconds pair as carried on the wire (two 32-bit words).
///
/// Values built through [`Timestamp::new`] or the clock are normalized so that
/// `0 <= nsec < 1e9`, which keeps the derived ordering chronological. Decoded
/// command timestamps keep the words as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i32,
    pub nsec: i32,
}

impl Timestamp {
    /// The "immediate" marker on set commands.
    pub const ZERO: Timestamp = Timestamp { sec: 0, nsec: 0 };

    pub fn new(sec: i32, nsec: i32) -> Self {
        Self::from_total_nanos(sec as i64 * NANOS_PER_SEC + nsec as i64)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Timestamp `duration` after `self`, saturating at the 32-bit horizon.
    pub fn add(self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self::from_total_nanos(self.total_nanos().saturating_add(nanos))
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: Timestamp) -> Duration {
        let diff = self.total_nanos() - earlier.total_nanos();
        if diff <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(diff as u64)
        }
    }

    fn total_nanos(self) -> i64 {
        self.sec as i64 * NANOS_PER_SEC + self.nsec as i64
    }

    fn from_total_nanos(total: i64) -> Self {
        let sec = total.div_euclid(NANOS_PER_SEC).clamp(i32::MIN as i64, i32::MAX as i64);
        let nsec = total.rem_euclid(NANOS_PER_SEC);
        Self { sec: sec as i32, nsec: nsec as i32 }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("system time {0}s does not fit a 32-bit timestamp")]
    OutOfRange(i64),
}

pub trait Clock {
    fn now(&self) -> Result<Timestamp, ClockError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        let now = Utc::now();
        let secs = now.timestamp();
        let sec = i32::try_from(secs).map_err(|_| ClockError::OutOfRange(secs))?;
        Ok(Timestamp::new(sec, now.timestamp_subsec_nanos() as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_carries_nanoseconds() {
        let t = Timestamp::new(10, 900_000_000).add(Duration::from_millis(250));
        assert_eq!(t, Timestamp::new(11, 150_000_000));
    }

    #[test]
    fn test_ordering_and_since() {
        let a = Timestamp::new(5, 0);
        let b = a.add(Duration::from_secs(3));
        assert!(b > a);
        assert_eq!(b.since(a), Duration::from_secs(3));
        assert_eq!(a.since(b), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        let now = SystemClock.now().unwrap();
        assert!(now.sec > 1_600_000_000);
        assert!(!now.is_zero());
    }
}

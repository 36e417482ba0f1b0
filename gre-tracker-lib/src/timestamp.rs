use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, Sub},
    sync::OnceLock,
    time::{Duration, Instant},
};

const NANOS_PER_SEC: u64 = 1_000_000_000;

static MONOTONIC_ANCHOR: OnceLock<Instant> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64); // Nanoseconds since an epoch (Unix, or the monotonic anchor)

impl Timestamp {
    pub const ZERO: Self = Timestamp(0);

    /// Monotonic time, counted from the first call in this process.
    ///
    /// Unaffected by wall-clock steps; only meaningful when compared with
    /// other monotonic timestamps.
    #[inline]
    pub fn monotonic() -> Self {
        let anchor = MONOTONIC_ANCHOR.get_or_init(Instant::now);
        Self(u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }

    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    #[inline]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(date_time) = DateTime::from_timestamp(
            (self.0 / NANOS_PER_SEC) as i64,
            (self.0 % NANOS_PER_SEC) as u32,
        ) {
            if !f.alternate() {
                return write!(f, "{}", date_time.format("%Y/%m/%d-%H:%M:%S UTC"));
            }
        }

        write!(f, "{}.{:09}", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Interval(pub i64); // Signed nanoseconds

impl Interval {
    pub const ZERO: Self = Interval(0);

    #[inline]
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        Self(i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(NANOS_PER_SEC as i64))
    }

    #[inline]
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Whole seconds, truncated toward zero.
    #[inline]
    pub fn as_secs(&self) -> i64 {
        self.0 / NANOS_PER_SEC as i64
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }
}

impl From<Duration> for Interval {
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_nanos = self.0.unsigned_abs();
        let secs = total_nanos / NANOS_PER_SEC;
        let nanos = total_nanos % NANOS_PER_SEC;
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:09}", sign, secs, nanos)
    }
}

impl Add<Interval> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn add(self, rhs: Interval) -> Self::Output {
        Timestamp(self.0.saturating_add_signed(rhs.0))
    }
}

impl Sub<Interval> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn sub(self, rhs: Interval) -> Self::Output {
        Timestamp(self.0.saturating_sub_signed(rhs.0))
    }
}

impl Sub for Timestamp {
    type Output = Interval;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        if self.0 >= rhs.0 {
            Interval((self.0 - rhs.0) as i64)
        } else {
            Interval(-((rhs.0 - self.0) as i64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_difference() {
        let a = Timestamp::from_secs(100);
        let b = Timestamp::from_secs(151);
        assert_eq!(b - a, Interval::from_secs(51));
        assert_eq!((a - b).as_secs(), -51);
    }

    #[test]
    fn test_timestamp_interval_arithmetic() {
        let t = Timestamp::from_secs(10);
        assert_eq!(t + Interval::from_secs(5), Timestamp::from_secs(15));
        assert_eq!(t - Interval::from_secs(5), Timestamp::from_secs(5));
        assert_eq!(t - Interval::from_secs(50), Timestamp::ZERO);
    }

    #[test]
    fn test_interval_from_duration() {
        assert_eq!(Interval::from(Duration::from_secs(50)), Interval::from_secs(50));
        assert_eq!(Interval::from(Duration::from_millis(1500)).as_secs(), 1);
        assert_eq!(Interval::from(Duration::MAX), Interval(i64::MAX));
    }

    #[test]
    fn test_display() {
        assert_eq!(Interval::from_nanos(-1_500_000_000).to_string(), "-1.500000000");
        assert_eq!(format!("{:#}", Timestamp::from_nanos(1_000_000_001)), "1.000000001");
        assert_eq!(Timestamp::from_secs(0).to_string(), "1970/01/01-00:00:00 UTC");
    }

    #[test]
    fn test_monotonic_never_goes_back() {
        let a = Timestamp::monotonic();
        std::thread::sleep(Duration::from_millis(5));
        let b = Timestamp::monotonic();
        assert!(b - a >= Interval::from(Duration::from_millis(5)));
    }

    #[test]
    fn test_huge_interval_saturates() {
        assert_eq!(Interval::from_secs(u64::MAX), Interval(i64::MAX));
        assert_eq!(Interval::from_secs(i64::MAX as u64 + 1), Interval(i64::MAX));
        assert!(Interval::from_secs(u64::MAX) > Interval::ZERO);
    }
}

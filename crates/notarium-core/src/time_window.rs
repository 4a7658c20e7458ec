//! Timestamps, time windows and injectable clocks.
//!
//! Time is carried on the wire as whole milliseconds since the Unix epoch so
//! that it has a single canonical Borsh encoding.

use core::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use borsh::{BorshDeserialize, BorshSerialize};
use time::{Duration, OffsetDateTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::CoreError;

/// Milliseconds since the Unix epoch (UTC).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Convert from a `time` datetime, truncating to milliseconds.
    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        let millis = dt.unix_timestamp_nanos() / 1_000_000;
        Self(millis.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }

    /// Milliseconds since the epoch.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Shift by a (possibly negative) duration, saturating at the range ends.
    pub fn saturating_add(self, d: Duration) -> Self {
        let delta = d.whole_milliseconds().clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
        Self(self.0.saturating_add(delta))
    }

    /// Shift backwards by a duration, saturating at the range ends.
    pub fn saturating_sub(self, d: Duration) -> Self {
        self.saturating_add(-d)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = i128::from(self.0) * 1_000_000;
        match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
            Ok(dt) => write!(f, "{dt}"),
            Err(_) => write!(f, "{}ms", self.0),
        }
    }
}

/// Validity interval of a transaction: `[from_time, until_time)`.
///
/// Either bound may be open, but not both.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeWindow {
    from_time: Option<Timestamp>,
    until_time: Option<Timestamp>,
}

impl TimeWindow {
    /// Window open from `from_time` onwards.
    pub const fn from_only(from_time: Timestamp) -> Self {
        Self {
            from_time: Some(from_time),
            until_time: None,
        }
    }

    /// Window open until (exclusive) `until_time`.
    pub const fn until_only(until_time: Timestamp) -> Self {
        Self {
            from_time: None,
            until_time: Some(until_time),
        }
    }

    /// Window `[from_time, until_time)`; requires `from_time < until_time`.
    pub fn between(from_time: Timestamp, until_time: Timestamp) -> Result<Self, CoreError> {
        if from_time >= until_time {
            return Err(CoreError::InvalidValue("time window from_time must precede until_time"));
        }
        Ok(Self {
            from_time: Some(from_time),
            until_time: Some(until_time),
        })
    }

    /// Window centred on `instant`, extending `tolerance` either side.
    pub fn with_tolerance(instant: Timestamp, tolerance: Duration) -> Result<Self, CoreError> {
        Self::between(instant.saturating_sub(tolerance), instant.saturating_add(tolerance))
    }

    /// Inclusive lower bound, if any.
    pub const fn from_time(&self) -> Option<Timestamp> {
        self.from_time
    }

    /// Exclusive upper bound, if any.
    pub const fn until_time(&self) -> Option<Timestamp> {
        self.until_time
    }

    /// Whether `instant` lies in `[from_time, until_time)`.
    pub fn contains(&self, instant: Timestamp) -> bool {
        let after_start = self.from_time.map_or(true, |from| instant >= from);
        let before_end = self.until_time.map_or(true, |until| instant < until);
        after_start && before_end
    }

    /// Midpoint of a bounded window.
    pub fn midpoint(&self) -> Option<Timestamp> {
        match (self.from_time, self.until_time) {
            (Some(from), Some(until)) => {
                Some(Timestamp(((i128::from(from.0) + i128::from(until.0)) / 2) as i64))
            }
            _ => None,
        }
    }

    /// Length of a bounded window.
    pub fn length(&self) -> Option<Duration> {
        match (self.from_time, self.until_time) {
            (Some(from), Some(until)) => Some(Duration::milliseconds(until.0.saturating_sub(from.0))),
            _ => None,
        }
    }

    /// Rejects decoded windows with neither bound or inverted bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.from_time, self.until_time) {
            (None, None) => Err(CoreError::InvalidValue("time window has no bounds")),
            (Some(from), Some(until)) if from >= until => {
                Err(CoreError::InvalidValue("time window from_time must precede until_time"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from_time, self.until_time) {
            (Some(from), Some(until)) => write!(f, "[{from}, {until})"),
            (Some(from), None) => write!(f, "[{from}, ∞)"),
            (None, Some(until)) => write!(f, "(-∞, {until})"),
            (None, None) => f.write_str("(-∞, ∞)"),
        }
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A manually driven clock for deterministic tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    /// Clock frozen at `at`.
    pub fn new(at: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(at.0),
        }
    }

    /// Jump to `at`.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.0, Ordering::SeqCst);
    }

    /// Move forward by `d`.
    pub fn advance(&self, d: Duration) {
        let next = self.now().saturating_add(d);
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

//! Wall-clock timestamps with an explicit seconds + nanos split.
//!
//! Task schedule times are carried as `(seconds, nanos)` pairs so that adding a
//! backoff never loses sub-second precision and never lets `nanos` leave
//! `[0, 1_000_000_000)`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A point in time as seconds since the Unix epoch plus a non-negative
/// sub-second part.
///
/// Invariant: `0 <= nanos < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: i64,
    nanos: i32,
}

impl Timestamp {
    pub const MAX: Timestamp = Timestamp {
        seconds: i64::MAX,
        nanos: (NANOS_PER_SECOND - 1) as i32,
    };

    pub const fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Build a timestamp, normalizing any out-of-range `nanos` into `seconds`.
    pub fn new(seconds: i64, nanos: i64) -> Self {
        let carry = nanos.div_euclid(NANOS_PER_SECOND);
        let nanos = nanos.rem_euclid(NANOS_PER_SECOND);
        match seconds.checked_add(carry) {
            Some(seconds) => Self {
                seconds,
                nanos: nanos as i32,
            },
            None if carry > 0 => Self::MAX,
            None => Self {
                seconds: i64::MIN,
                nanos: 0,
            },
        }
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    /// Same instant with the sub-second part dropped.
    pub fn truncated_to_seconds(self) -> Self {
        Self {
            seconds: self.seconds,
            nanos: 0,
        }
    }

    /// `self + delta`, carrying nanos overflow into seconds.
    ///
    /// Saturates at [`Timestamp::MAX`] instead of wrapping.
    pub fn saturating_add(self, delta: Duration) -> Self {
        let Ok(delta_seconds) = i64::try_from(delta.as_secs()) else {
            return Self::MAX;
        };
        let Some(mut seconds) = self.seconds.checked_add(delta_seconds) else {
            return Self::MAX;
        };

        // Both parts are below 1e9, so the sum fits comfortably in i64.
        let mut nanos = i64::from(self.nanos) + i64::from(delta.subsec_nanos());
        if nanos >= NANOS_PER_SECOND {
            let Some(carried) = seconds.checked_add(1) else {
                return Self::MAX;
            };
            seconds = carried;
            nanos -= NANOS_PER_SECOND;
        }

        Self {
            seconds,
            nanos: nanos as i32,
        }
    }

    /// How long from `now` until `self`. `None` when `self` is not in the future.
    pub fn duration_since(&self, now: Timestamp) -> Option<Duration> {
        if *self <= now {
            return None;
        }
        let mut seconds = self.seconds.saturating_sub(now.seconds);
        let mut nanos = i64::from(self.nanos) - i64::from(now.nanos);
        if nanos < 0 {
            seconds -= 1;
            nanos += NANOS_PER_SECOND;
        }
        // seconds >= 0 here because self > now.
        Some(Duration::new(seconds as u64, nanos as u32))
    }

    /// Fractional epoch seconds, as used in task ETA headers.
    pub fn as_epoch_secs_f64(&self) -> f64 {
        self.seconds as f64 + f64::from(self.nanos) / NANOS_PER_SECOND as f64
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos as u32).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            seconds: value.timestamp(),
            nanos: value.timestamp_subsec_nanos() as i32,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}.{:09}s", self.seconds, self.nanos),
        }
    }
}

//! OSC time tags
//!
//! A time tag is a 64-bit NTP timestamp: 32 bits of seconds since
//! 1900-01-01 followed by 32 bits of fractional seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const FRACTION_SCALE: u64 = 1 << 32;

/// NTP-style timestamp carried by bundles and `t` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeTag {
    pub seconds: u32,
    pub fraction: u32,
}

impl TimeTag {
    /// The special "execute immediately" time tag
    pub const IMMEDIATE: TimeTag = TimeTag {
        seconds: 0,
        fraction: 1,
    };

    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// True for the reserved (0, 1) value
    pub fn is_immediate(&self) -> bool {
        self.seconds == 0 && self.fraction == 1
    }

    /// Time tag for the current wall clock
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a wall clock instant. Instants before 1900 clamp to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_ntp_epoch = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d + Duration::from_secs(NTP_UNIX_OFFSET),
            Err(e) => Duration::from_secs(NTP_UNIX_OFFSET).saturating_sub(e.duration()),
        };
        let fraction = (since_ntp_epoch.subsec_nanos() as u64 * FRACTION_SCALE) / 1_000_000_000;
        Self {
            seconds: since_ntp_epoch.as_secs() as u32,
            fraction: fraction as u32,
        }
    }

    /// Wall clock instant of this tag. The immediate tag maps to now.
    pub fn to_system_time(&self) -> SystemTime {
        if self.is_immediate() {
            return SystemTime::now();
        }
        let nanos = (self.fraction as u64 * 1_000_000_000) / FRACTION_SCALE;
        let since_ntp_epoch = Duration::new(self.seconds as u64, nanos as u32);
        let offset = Duration::from_secs(NTP_UNIX_OFFSET);
        if since_ntp_epoch >= offset {
            UNIX_EPOCH + (since_ntp_epoch - offset)
        } else {
            UNIX_EPOCH - (offset - since_ntp_epoch)
        }
    }

    /// Build from Unix epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        let time = if millis >= 0 {
            UNIX_EPOCH + Duration::from_millis(millis as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
        };
        Self::from_system_time(time)
    }

    /// Unix epoch milliseconds
    pub fn as_millis(&self) -> i64 {
        if self.is_immediate() {
            return unix_millis(SystemTime::now());
        }
        let epoch_seconds = self.seconds as i64 - NTP_UNIX_OFFSET as i64;
        let millis = (self.fraction as i64 * 1000) / FRACTION_SCALE as i64;
        epoch_seconds * 1000 + millis
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            write!(f, "immediate")
        } else {
            write!(f, "{}.{:08x}", self.seconds, self.fraction)
        }
    }
}

fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

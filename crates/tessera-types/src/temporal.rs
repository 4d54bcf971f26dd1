use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Text format of auto-generated timestamp fields: UTC, millisecond
/// precision, numeric zone offset.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Milliseconds since the UNIX epoch.
///
/// Serialized as a bare integer so stored metadata stays compact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self(millis)
    }

    /// Construct from raw epoch milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Raw epoch milliseconds.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed from `self` until `later` (zero if negative).
    pub fn millis_until(&self, later: Timestamp) -> u64 {
        later.0.saturating_sub(self.0).max(0) as u64
    }

    /// Format as `yyyy-MM-ddTHH:mm:ss.SSS+0000`.
    pub fn format(&self) -> String {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
            None => self.0.to_string(),
        }
    }

    /// Parse the output of [`Timestamp::format`].
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        DateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .map(|dt| Self(dt.with_timezone(&Utc).timestamp_millis()))
            .map_err(|e| TypeError::InvalidTimestamp(format!("{text}: {e}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

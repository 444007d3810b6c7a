//! Numeric configuration for the clustering pipeline.

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day; offsets must stay strictly inside this bound.
const MINUTES_PER_DAY: i32 = 24 * 60;

/// Invalid configuration, reported before any event is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gap_minutes must be at least 1, got {0}")]
    GapTooSmall(i64),
    #[error("pull_lookback_minutes cannot be negative, got {0}")]
    NegativeLookback(i64),
    #[error("merge_grace_minutes cannot be negative, got {0}")]
    NegativeGrace(i64),
    #[error("local_offset_minutes must be within one day of UTC, got {0}")]
    OffsetOutOfRange(i32),
    #[error("{field} is too large to represent as a duration, got {value}")]
    DurationOverflow { field: &'static str, value: i64 },
}

/// Converts a minute count into a [`Duration`], rejecting values chrono cannot hold.
pub(crate) fn checked_minutes(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    Duration::try_minutes(value).ok_or(ConfigError::DurationOverflow { field, value })
}

/// Configuration for session segmentation and overlap detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Maximum gap between consecutive events of one session.
    /// Default: 60.
    pub gap_minutes: i64,

    /// How far before a session's first event a pull mark may sit and
    /// still be taken as the session's real start. Default: 120.
    pub pull_lookback_minutes: i64,

    /// Raw overlap periods separated by at most this many minutes are
    /// merged. Default: 5.
    pub merge_grace_minutes: i64,

    /// UTC offset used for timestamps that carry no zone. Default: 0.
    pub local_offset_minutes: i32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            gap_minutes: 60,
            pull_lookback_minutes: 120,
            merge_grace_minutes: 5,
            local_offset_minutes: 0,
        }
    }
}

impl CoreConfig {
    /// Checks every numeric bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gap_minutes < 1 {
            return Err(ConfigError::GapTooSmall(self.gap_minutes));
        }
        if self.pull_lookback_minutes < 0 {
            return Err(ConfigError::NegativeLookback(self.pull_lookback_minutes));
        }
        if self.merge_grace_minutes < 0 {
            return Err(ConfigError::NegativeGrace(self.merge_grace_minutes));
        }
        if self.local_offset_minutes <= -MINUTES_PER_DAY
            || self.local_offset_minutes >= MINUTES_PER_DAY
        {
            return Err(ConfigError::OffsetOutOfRange(self.local_offset_minutes));
        }
        checked_minutes("gap_minutes", self.gap_minutes)?;
        checked_minutes("pull_lookback_minutes", self.pull_lookback_minutes)?;
        checked_minutes("merge_grace_minutes", self.merge_grace_minutes)?;
        Ok(())
    }

    /// The configured offset for zone-less timestamps.
    pub fn local_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.local_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::OffsetOutOfRange(self.local_offset_minutes))
    }
}

//! Manager configuration: the four tunable lifecycle scalars.

use std::ops::RangeInclusive;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_PERSIST_DURATION: u64 = 60;
pub const DEFAULT_CLEANUP_INTERVAL: u64 = 300;
pub const DEFAULT_FINALIZED_GRACE_PERIOD: u64 = 30;
pub const DEFAULT_INACTIVE_MAX_AGE: u64 = 86_400;

pub const MIN_PERSIST_DURATION_RANGE: RangeInclusive<u64> = 1..=300;
pub const CLEANUP_INTERVAL_RANGE: RangeInclusive<u64> = 60..=3600;
pub const FINALIZED_GRACE_PERIOD_RANGE: RangeInclusive<u64> = 0..=300;
pub const INACTIVE_MAX_AGE_RANGE: RangeInclusive<u64> = 3600..=604_800;

/// Lifecycle tunables, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Entities expected to live shorter than this are not persisted.
    pub min_persist_duration: u64,
    /// Period of the cleanup sweep.
    pub cleanup_interval: u64,
    /// Delay between finalization and removal.
    pub finalized_grace_period: u64,
    /// Maximum age, measured from creation, of a paused entity.
    pub inactive_max_age: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            min_persist_duration: DEFAULT_MIN_PERSIST_DURATION,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            finalized_grace_period: DEFAULT_FINALIZED_GRACE_PERIOD,
            inactive_max_age: DEFAULT_INACTIVE_MAX_AGE,
        }
    }
}

impl ManagerConfig {
    /// Reject any scalar outside its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("min_persist_duration", self.min_persist_duration, MIN_PERSIST_DURATION_RANGE)?;
        check("cleanup_interval", self.cleanup_interval, CLEANUP_INTERVAL_RANGE)?;
        check(
            "finalized_grace_period",
            self.finalized_grace_period,
            FINALIZED_GRACE_PERIOD_RANGE,
        )?;
        check("inactive_max_age", self.inactive_max_age, INACTIVE_MAX_AGE_RANGE)?;
        Ok(())
    }

    pub fn persist_threshold(&self) -> TimeDelta {
        secs(self.min_persist_duration)
    }

    pub fn sweep_period(&self) -> TimeDelta {
        secs(self.cleanup_interval)
    }

    pub fn grace_period(&self) -> TimeDelta {
        secs(self.finalized_grace_period)
    }

    pub fn max_inactive_age(&self) -> TimeDelta {
        secs(self.inactive_max_age)
    }
}

fn check(name: &'static str, value: u64, range: RangeInclusive<u64>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

/// A configuration value was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max} seconds, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

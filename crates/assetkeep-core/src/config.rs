//! Retention windows.
//!
//! All three windows are whole days. Comparisons against them are strict:
//! an asset is kept while `now - start < window`.

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const ENV_CLOSED_BUG_EMBARGO_DAYS: &str = "ASSETKEEP_CLOSED_BUG_EMBARGO_DAYS";
pub const ENV_SUPERSESSION_EMBARGO_DAYS: &str = "ASSETKEEP_SUPERSESSION_EMBARGO_DAYS";
pub const ENV_FRESH_ASSET_GRACE_DAYS: &str = "ASSETKEEP_FRESH_ASSET_GRACE_DAYS";

/// Errors from loading [`RetentionConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative whole number of days, got {value:?}")]
    InvalidDays { var: String, value: String },
}

/// Retention windows for the liveness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long bug-tied assets stay needed after their last bug closed.
    pub closed_bug_embargo_days: u32,
    /// How long a superseded coverage report stays needed after its own upload.
    pub supersession_embargo_days: u32,
    /// Bug-tied assets younger than this are needed regardless of bug state.
    /// Zero disables the grace.
    pub fresh_asset_grace_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            closed_bug_embargo_days: 30,
            supersession_embargo_days: 14,
            fresh_asset_grace_days: 14,
        }
    }
}

impl RetentionConfig {
    /// Defaults overridden by any `ASSETKEEP_*_DAYS` variable that is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |var: &str, slot: &mut u32| -> Result<(), ConfigError> {
            if let Some(value) = lookup(var) {
                *slot = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidDays {
                        var: var.to_string(),
                        value,
                    })?;
            }
            Ok(())
        };
        read(ENV_CLOSED_BUG_EMBARGO_DAYS, &mut cfg.closed_bug_embargo_days)?;
        read(
            ENV_SUPERSESSION_EMBARGO_DAYS,
            &mut cfg.supersession_embargo_days,
        )?;
        read(ENV_FRESH_ASSET_GRACE_DAYS, &mut cfg.fresh_asset_grace_days)?;
        Ok(cfg)
    }

    pub fn closed_bug_embargo(&self) -> Duration {
        Duration::days(i64::from(self.closed_bug_embargo_days))
    }

    pub fn supersession_embargo(&self) -> Duration {
        Duration::days(i64::from(self.supersession_embargo_days))
    }

    pub fn fresh_asset_grace(&self) -> Duration {
        Duration::days(i64::from(self.fresh_asset_grace_days))
    }
}

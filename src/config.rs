//! Operator configuration
//!
//! Flags double as environment variables so the Deployment manifest can set
//! them without touching the container args.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::requeue::Backoff;
use crate::{Error, Result};

/// Client read timeout; watches must close before it fires
const CLIENT_READ_TIMEOUT_SECS: u32 = 30;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Plain,
}

/// Tunables of the StorageCluster controller
#[derive(Debug, Clone, Args)]
pub struct OperatorConfig {
    /// Re-check interval for converged clusters
    #[arg(long, env = "LOGSTORE_RESYNC_INTERVAL_SECS", default_value_t = 300)]
    pub resync_interval_secs: u64,

    /// Delay before retrying after a version conflict
    #[arg(long, env = "LOGSTORE_CONFLICT_RETRY_MILLIS", default_value_t = 500)]
    pub conflict_retry_millis: u64,

    /// Backoff after the first failed pass
    #[arg(long, env = "LOGSTORE_ERROR_BACKOFF_SECS", default_value_t = 5)]
    pub error_backoff_secs: u64,

    /// Upper bound on the failure backoff
    #[arg(long, env = "LOGSTORE_MAX_BACKOFF_SECS", default_value_t = 300)]
    pub max_backoff_secs: u64,

    /// Deadline for one reconciliation pass
    #[arg(long, env = "LOGSTORE_PASS_TIMEOUT_SECS", default_value_t = 30)]
    pub pass_timeout_secs: u64,

    /// Server-side watch timeout, must stay below the client read timeout
    #[arg(long, env = "LOGSTORE_WATCH_TIMEOUT_SECS", default_value_t = 25)]
    pub watch_timeout_secs: u32,

    /// Log output format
    #[arg(long, env = "LOGSTORE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 300,
            conflict_retry_millis: 500,
            error_backoff_secs: 5,
            max_backoff_secs: 300,
            pass_timeout_secs: 30,
            watch_timeout_secs: 25,
            log_format: LogFormat::Json,
        }
    }
}

impl OperatorConfig {
    /// Validate the flags and derive the reconciler settings
    pub fn settings(&self) -> Result<ReconcileSettings> {
        if self.watch_timeout_secs == 0 || self.watch_timeout_secs >= CLIENT_READ_TIMEOUT_SECS {
            return Err(Error::config(format!(
                "watch timeout must be between 1 and {}s, got {}s",
                CLIENT_READ_TIMEOUT_SECS - 1,
                self.watch_timeout_secs
            )));
        }
        if self.pass_timeout_secs == 0 {
            return Err(Error::config("pass timeout must be positive"));
        }
        if self.error_backoff_secs == 0 || self.error_backoff_secs > self.max_backoff_secs {
            return Err(Error::config(format!(
                "error backoff ({}s) must be positive and at most the max backoff ({}s)",
                self.error_backoff_secs, self.max_backoff_secs
            )));
        }

        Ok(ReconcileSettings {
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            conflict_retry: Duration::from_millis(self.conflict_retry_millis),
            backoff: Backoff {
                base: Duration::from_secs(self.error_backoff_secs),
                max: Duration::from_secs(self.max_backoff_secs),
            },
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
        })
    }
}

/// Timing policy shared by the reconciler, the pipeline and the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Requeue interval after a converged pass
    pub resync_interval: Duration,
    /// Delay after a version conflict or lost create race
    pub conflict_retry: Duration,
    /// Backoff for error-backed signals
    pub backoff: Backoff,
    /// Deadline for one pass
    pub pass_timeout: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            conflict_retry: Duration::from_millis(500),
            backoff: Backoff {
                base: Duration::from_secs(5),
                max: Duration::from_secs(300),
            },
            pass_timeout: Duration::from_secs(30),
        }
    }
}

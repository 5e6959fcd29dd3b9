//! Configuration for the delivery core
//!
//! `DeliveryConfig` is a plain struct with defaults taken from
//! `hydrolink_shared::delivery`. Binaries build it from [`DeliveryArgs`], which
//! reads command-line flags with `HYDROLINK_*` environment fallbacks.

use clap::Args;
use hydrolink_shared::{delivery, RetryPolicy};
use std::time::Duration;

/// Timeout sweeper settings
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Age of `sent_at` after which a SENT/ACK command is timed out
    pub timeout_minutes: u32,
    /// Sweep period
    pub sweep_interval: Duration,
    /// Maximum commands examined per sweep
    pub batch_size: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: delivery::COMMAND_TIMEOUT_MINUTES,
            sweep_interval: Duration::from_millis(delivery::SWEEP_INTERVAL_MS),
            batch_size: 500,
        }
    }
}

impl TimeoutConfig {
    pub fn timeout_ms(&self) -> i64 {
        i64::from(self.timeout_minutes) * 60 * 1000
    }
}

/// Settings for a queue-draining worker
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub interval: Duration,
    pub batch_size: u32,
    /// How long a claimed row stays invisible to other workers
    pub claim_lease: Duration,
}

impl DispatchConfig {
    pub fn alerts() -> Self {
        Self {
            interval: Duration::from_millis(delivery::ALERT_DISPATCH_INTERVAL_MS),
            batch_size: 50,
            claim_lease: Duration::from_millis(delivery::CLAIM_LEASE_MS),
        }
    }

    pub fn status_updates() -> Self {
        Self {
            interval: Duration::from_millis(delivery::STATUS_APPLY_INTERVAL_MS),
            batch_size: 100,
            claim_lease: Duration::from_secs(30),
        }
    }

    pub fn claim_lease_ms(&self) -> i64 {
        i64::try_from(self.claim_lease.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Scheduled DLQ replay settings
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub older_than_hours: u32,
    pub limit: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(delivery::REPLAY_INTERVAL_MS),
            older_than_hours: delivery::REPLAY_OLDER_THAN_HOURS,
            limit: delivery::REPLAY_LIMIT,
        }
    }
}

/// Configuration for the whole delivery core
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub database_url: String,
    pub timeout: TimeoutConfig,
    pub alert_retry: RetryPolicy,
    pub status_retry: RetryPolicy,
    pub alert_dispatch: DispatchConfig,
    pub status_apply: DispatchConfig,
    pub replay: ReplayConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://hydrolink.db".into(),
            timeout: TimeoutConfig::default(),
            alert_retry: RetryPolicy::alerts(),
            status_retry: RetryPolicy::status_updates(),
            alert_dispatch: DispatchConfig::alerts(),
            status_apply: DispatchConfig::status_updates(),
            replay: ReplayConfig::default(),
        }
    }
}

/// Command-line / environment overrides for [`DeliveryConfig`]
#[derive(Args, Debug, Clone, Default)]
pub struct DeliveryArgs {
    /// SQLite database URL
    #[arg(long, env = "HYDROLINK_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minutes before an unanswered SENT/ACK command times out
    #[arg(long, env = "HYDROLINK_TIMEOUT_MINUTES")]
    pub timeout_minutes: Option<u32>,

    /// Timeout sweep period in seconds
    #[arg(long, env = "HYDROLINK_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Delivery attempts before an alert is dead-lettered
    #[arg(long, env = "HYDROLINK_ALERT_MAX_ATTEMPTS")]
    pub alert_max_attempts: Option<u32>,

    /// Base alert backoff in milliseconds
    #[arg(long, env = "HYDROLINK_ALERT_BACKOFF_MS")]
    pub alert_backoff_ms: Option<u64>,

    /// Apply attempts before a status update is dead-lettered
    #[arg(long, env = "HYDROLINK_STATUS_MAX_ATTEMPTS")]
    pub status_max_attempts: Option<u32>,

    /// Base status-update backoff in milliseconds
    #[arg(long, env = "HYDROLINK_STATUS_BACKOFF_MS")]
    pub status_backoff_ms: Option<u64>,

    /// Disable the scheduled DLQ replay worker
    #[arg(long, env = "HYDROLINK_NO_SCHEDULED_REPLAY")]
    pub no_scheduled_replay: bool,

    /// Minimum DLQ age in hours for scheduled replay
    #[arg(long, env = "HYDROLINK_REPLAY_OLDER_THAN_HOURS")]
    pub replay_older_than_hours: Option<u32>,

    /// Maximum DLQ rows per scheduled replay
    #[arg(long, env = "HYDROLINK_REPLAY_LIMIT")]
    pub replay_limit: Option<u32>,
}

impl DeliveryArgs {
    /// Apply the overrides on top of the defaults
    pub fn into_config(self) -> DeliveryConfig {
        let mut config = DeliveryConfig::default();

        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(minutes) = self.timeout_minutes {
            config.timeout.timeout_minutes = minutes;
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.timeout.sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(max) = self.alert_max_attempts {
            config.alert_retry.max_attempts = max;
        }
        if let Some(ms) = self.alert_backoff_ms {
            config.alert_retry.base_delay_ms = ms;
        }
        if let Some(max) = self.status_max_attempts {
            config.status_retry.max_attempts = max;
        }
        if let Some(ms) = self.status_backoff_ms {
            config.status_retry.base_delay_ms = ms;
        }
        if self.no_scheduled_replay {
            config.replay.enabled = false;
        }
        if let Some(hours) = self.replay_older_than_hours {
            config.replay.older_than_hours = hours;
        }
        if let Some(limit) = self.replay_limit {
            config.replay.limit = limit;
        }

        config
    }
}

//! Hydrolink Shared Types
//!
//! This crate provides the vocabulary shared by the delivery core, the
//! daemon and the operator CLI: command/alert statuses, the command state
//! machine, retry policy, clocks and the event shapes exchanged with the
//! bridge.

pub mod clock;
pub mod codec;
pub mod events;
pub mod retry;
pub mod state_machine;
pub mod status;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::*;
pub use retry::RetryPolicy;
pub use status::*;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Delivery parameters for the system
pub mod delivery {
    /// Minutes a SENT/ACK command may wait before the sweeper times it out
    pub const COMMAND_TIMEOUT_MINUTES: u32 = 5;

    /// Timeout sweeper period
    pub const SWEEP_INTERVAL_MS: u64 = 30_000;

    /// Alert dispatcher period
    pub const ALERT_DISPATCH_INTERVAL_MS: u64 = 10_000;

    /// Status-update applier period
    pub const STATUS_APPLY_INTERVAL_MS: u64 = 5_000;

    /// DLQ replay period
    pub const REPLAY_INTERVAL_MS: u64 = 60 * 60 * 1000;

    /// Minimum age of a DLQ row before scheduled replay picks it up
    pub const REPLAY_OLDER_THAN_HOURS: u32 = 24;

    /// Maximum DLQ rows replayed per run
    pub const REPLAY_LIMIT: u32 = 100;

    /// How long a claimed queue row stays invisible to other workers
    pub const CLAIM_LEASE_MS: u64 = 60_000;

    /// Optimistic update retries before giving up on a contended command
    pub const MAX_CAS_RETRIES: u32 = 5;

    /// `error_code` written by the sweeper
    pub const TIMEOUT_ERROR_CODE: &str = "TIMEOUT";
}

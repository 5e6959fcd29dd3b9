//! Error type for the delivery core

use hydrolink_shared::{CommandStatus, ParseError};
use thiserror::Error;

/// Errors surfaced by the lifecycle manager, queues and workers
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid transition for {cmd_id}: {from} -> {to}")]
    InvalidTransition {
        cmd_id: String,
        from: CommandStatus,
        to: CommandStatus,
    },

    #[error("Command {0} kept changing under concurrent writers")]
    Contention(String),
}

impl DeliveryError {
    /// Whether retrying later through the reconciliation queue may succeed
    ///
    /// Missing commands (ordering race with creation), store failures and
    /// contention are transient. Validation and state-machine rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeliveryError::Database(_)
                | DeliveryError::CommandNotFound(_)
                | DeliveryError::Contention(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeliveryError::CommandNotFound("cmd-1".into()).is_transient());
        assert!(DeliveryError::Contention("cmd-1".into()).is_transient());
        assert!(DeliveryError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DeliveryError::Validation("bad".into()).is_transient());
        assert!(!DeliveryError::InvalidTransition {
            cmd_id: "cmd-1".into(),
            from: CommandStatus::Done,
            to: CommandStatus::Error,
        }
        .is_transient());
    }
}

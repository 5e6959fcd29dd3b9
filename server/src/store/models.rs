//! Row types for the delivery tables

use hydrolink_shared::state_machine;
use hydrolink_shared::{
    AckType, AlertSource, AlertStatus, CommandFinished, CommandStatus, StatusUpdateKind,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// A unit of work sent to exactly one node/channel
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Command {
    pub id: i64,
    pub cmd_id: String,
    pub zone_id: Option<i64>,
    pub node_id: Option<i64>,
    pub channel: Option<String>,
    pub cycle_id: Option<i64>,
    pub cmd: String,
    pub params: Json<Value>,
    #[sqlx(try_from = "String")]
    pub status: CommandStatus,
    pub source: String,
    pub request_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub sent_at: Option<i64>,
    pub ack_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_code: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl Command {
    /// Milliseconds from dispatch (or creation, if never sent) to `at_ms`
    pub fn elapsed_ms(&self, at_ms: i64) -> i64 {
        let start = self.sent_at.unwrap_or(self.created_at);
        at_ms.saturating_sub(start).max(0)
    }

    /// "command finished" notification for the current row
    pub fn finished_event(&self) -> CommandFinished {
        CommandFinished {
            cmd_id: self.cmd_id.clone(),
            status: self.status,
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            result_code: self
                .result_code
                .unwrap_or_else(|| state_machine::result_code(self.status)),
            duration_ms: self.duration_ms,
            zone_id: self.zone_id,
        }
    }
}

/// One logged confirmation phase for a command
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommandAck {
    pub id: i64,
    pub command_id: i64,
    #[sqlx(try_from = "String")]
    pub ack_type: AckType,
    pub measured_current: Option<f64>,
    pub measured_flow: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Json<Value>,
    pub created_at: i64,
}

/// Audit entry for an operator override
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommandOverride {
    pub id: i64,
    pub command_id: i64,
    #[sqlx(try_from = "String")]
    pub from_status: CommandStatus,
    #[sqlx(try_from = "String")]
    pub to_status: CommandStatus,
    pub reason: String,
    pub created_at: i64,
}

/// Zone-scoped timeline entry
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ZoneEvent {
    pub id: i64,
    pub zone_id: i64,
    pub event_type: String,
    pub payload: Json<Value>,
    pub created_at: i64,
}

/// Alert awaiting downstream delivery
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingAlert {
    pub id: i64,
    pub zone_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub source: AlertSource,
    pub code: String,
    pub alert_type: String,
    pub details: Json<Value>,
    pub attempts: i64,
    pub max_attempts: i64,
    #[sqlx(try_from = "String")]
    pub status: AlertStatus,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub next_retry_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Alert that exhausted its delivery attempts
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeadLetterAlert {
    pub id: i64,
    pub original_id: i64,
    pub zone_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub source: AlertSource,
    pub code: String,
    pub alert_type: String,
    pub details: Json<Value>,
    pub attempts: i64,
    pub max_attempts: i64,
    #[sqlx(try_from = "String")]
    pub status: AlertStatus,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub created_at: i64,
    pub moved_to_dlq_at: i64,
    pub replayed_at: Option<i64>,
    pub replay_count: i64,
}

/// Buffered node status event awaiting application
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingStatusUpdate {
    pub id: i64,
    pub cmd_id: String,
    #[sqlx(try_from = "String")]
    pub status: StatusUpdateKind,
    pub details: Json<Value>,
    pub retry_count: i64,
    pub max_attempts: i64,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Status event that could not be applied within its retry budget
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeadLetterStatusUpdate {
    pub id: i64,
    pub original_id: i64,
    pub cmd_id: String,
    #[sqlx(try_from = "String")]
    pub status: StatusUpdateKind,
    pub details: Json<Value>,
    pub retry_count: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub moved_to_dlq_at: i64,
}

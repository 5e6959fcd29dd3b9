//! Event shapes exchanged with the bridge, detectors and the UI layer

use crate::state_machine::ack_status;
use crate::{AckType, AlertSource, CommandStatus, StatusUpdateKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Zone timeline event type written when the sweeper times a command out
pub const COMMAND_TIMEOUT_EVENT: &str = "COMMAND_TIMEOUT";

/// Request to create a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommand {
    pub cmd_id: String,
    #[serde(default)]
    pub zone_id: Option<i64>,
    #[serde(default)]
    pub node_id: Option<i64>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub cycle_id: Option<i64>,
    pub cmd: String,
    #[serde(default = "empty_object")]
    pub params: Value,
    pub source: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl NewCommand {
    /// Minimal command for a node channel; remaining fields can be set directly
    pub fn new(cmd_id: impl Into<String>, cmd: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            zone_id: None,
            node_id: None,
            channel: None,
            cycle_id: None,
            cmd: cmd.into(),
            params: empty_object(),
            source: source.into(),
            request_id: None,
        }
    }

    pub fn with_zone(mut self, zone_id: i64) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn with_target(mut self, node_id: i64, channel: impl Into<String>) -> Self {
        self.node_id = Some(node_id);
        self.channel = Some(channel.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Acknowledgment from a node, relayed by the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAck {
    pub cmd_id: String,
    pub ack_type: AckType,
    #[serde(default)]
    pub measured_current: Option<f64>,
    #[serde(default)]
    pub measured_flow: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NodeAck {
    pub fn new(cmd_id: impl Into<String>, ack_type: AckType) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            ack_type,
            measured_current: None,
            measured_flow: None,
            error_message: None,
            metadata: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_telemetry(mut self, current: Option<f64>, flow: Option<f64>) -> Self {
        self.measured_current = current;
        self.measured_flow = flow;
        self
    }

    /// Whether the ack carries a non-empty error message
    pub fn reports_error(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }

    /// Whether measured telemetry backs up the claimed physical execution
    pub fn is_corroborated(&self) -> bool {
        self.measured_current.is_some() || self.measured_flow.is_some()
    }

    /// Command status this ack resolves to
    pub fn target_status(&self) -> CommandStatus {
        ack_status(self.ack_type, self.reports_error())
    }

    /// Re-express the ack as a status event for the reconciliation queue
    pub fn to_status_event(&self) -> NodeStatus {
        let status = match self.target_status() {
            CommandStatus::Ack => StatusUpdateKind::Ack,
            CommandStatus::Error => StatusUpdateKind::Error,
            _ => StatusUpdateKind::Done,
        };

        let mut details = Map::new();
        details.insert("ack_type".into(), json!(self.ack_type));
        if let Some(current) = self.measured_current {
            details.insert("measured_current".into(), json!(current));
        }
        if let Some(flow) = self.measured_flow {
            details.insert("measured_flow".into(), json!(flow));
        }
        if let Some(message) = &self.error_message {
            details.insert("error_message".into(), json!(message));
        }
        if let Some(metadata) = &self.metadata {
            details.insert("metadata".into(), metadata.clone());
        }

        NodeStatus {
            cmd_id: self.cmd_id.clone(),
            status,
            details: Value::Object(details),
        }
    }
}

/// Status event from a node, keyed by command id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub cmd_id: String,
    pub status: StatusUpdateKind,
    #[serde(default = "empty_object")]
    pub details: Value,
}

impl NodeStatus {
    pub fn new(cmd_id: impl Into<String>, status: StatusUpdateKind) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            status,
            details: empty_object(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// `details.<key>` as a string, if present
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// `details.<key>` as a number, if present
    pub fn detail_f64(&self, key: &str) -> Option<f64> {
        self.details.get(key).and_then(Value::as_f64)
    }
}

/// Alert raised by a detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    #[serde(default)]
    pub zone_id: Option<i64>,
    pub source: AlertSource,
    pub code: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default = "empty_object")]
    pub details: Value,
}

impl NewAlert {
    pub fn new(source: AlertSource, code: impl Into<String>, alert_type: impl Into<String>) -> Self {
        Self {
            zone_id: None,
            source,
            code: code.into(),
            alert_type: alert_type.into(),
            details: empty_object(),
        }
    }

    pub fn with_zone(mut self, zone_id: i64) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Operator request to requeue dead-lettered alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
    #[serde(default = "default_older_than_hours")]
    pub older_than_hours: u32,
    #[serde(default = "default_replay_limit")]
    pub limit: u32,
}

impl Default for ReplayRequest {
    fn default() -> Self {
        Self {
            older_than_hours: default_older_than_hours(),
            limit: default_replay_limit(),
        }
    }
}

/// Emitted exactly once when a command reaches a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFinished {
    pub cmd_id: String,
    pub status: CommandStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_code: i64,
    pub duration_ms: Option<i64>,
    pub zone_id: Option<i64>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn default_older_than_hours() -> u32 {
    crate::delivery::REPLAY_OLDER_THAN_HOURS
}

fn default_replay_limit() -> u32 {
    crate::delivery::REPLAY_LIMIT
}

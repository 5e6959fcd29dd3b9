//! Status vocabularies for commands, acks, alerts and buffered status updates
//!
//! Every enum here round-trips through the text form stored in the database
//! and carried on the wire. Parsing is strict: unknown text is an error, never
//! a silent default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when text does not name a known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Implements `as_str`, `Display`, `FromStr` and `TryFrom<String>` from one table
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants, in declaration order
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Text form used in storage and on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, ParseError> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ParseError::new($kind, other)),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ParseError;

            fn try_from(value: String) -> Result<Self, ParseError> {
                value.parse()
            }
        }
    };
}

/// Lifecycle status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Created, not yet published to the node
    Queued,
    /// Published by the bridge
    Sent,
    /// Node accepted the command
    Ack,
    /// Node executed the command
    Done,
    /// Node executed but nothing changed physically
    NoEffect,
    /// Node reported a failure
    Error,
    /// Node rejected the command as malformed
    Invalid,
    /// Node refused because the channel was busy
    Busy,
    /// No terminal answer arrived in time
    Timeout,
    /// The bridge could not publish the command
    SendFailed,
}

text_enum!(CommandStatus, "command status", {
    Queued => "QUEUED",
    Sent => "SENT",
    Ack => "ACK",
    Done => "DONE",
    NoEffect => "NO_EFFECT",
    Error => "ERROR",
    Invalid => "INVALID",
    Busy => "BUSY",
    Timeout => "TIMEOUT",
    SendFailed => "SEND_FAILED",
});

impl CommandStatus {
    /// Whether no further node event may change this status
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CommandStatus::Queued | CommandStatus::Sent | CommandStatus::Ack
        )
    }

    /// Whether the command finished successfully (`result_code = 0`)
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Done | CommandStatus::NoEffect)
    }
}

/// Phase of a two-phase acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckType {
    Accepted,
    Executed,
    Verified,
    Error,
}

text_enum!(AckType, "ack type", {
    Accepted => "accepted",
    Executed => "executed",
    Verified => "verified",
    Error => "error",
});

/// Origin of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    /// Business rule detectors (dosing drift, out-of-range readings)
    Biz,
    /// Infrastructure detectors (bridge down, queue backlog)
    Infra,
    /// Raised by a node itself
    Node,
}

text_enum!(AlertSource, "alert source", {
    Biz => "biz",
    Infra => "infra",
    Node => "node",
});

/// Delivery status of an alert row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Failed,
    Dlq,
}

text_enum!(AlertStatus, "alert status", {
    Pending => "pending",
    Failed => "failed",
    Dlq => "dlq",
});

/// Subset of [`CommandStatus`] a node may report through a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusUpdateKind {
    Sent,
    Ack,
    Done,
    Error,
    Invalid,
    Busy,
    NoEffect,
}

text_enum!(StatusUpdateKind, "status update", {
    Sent => "SENT",
    Ack => "ACK",
    Done => "DONE",
    Error => "ERROR",
    Invalid => "INVALID",
    Busy => "BUSY",
    NoEffect => "NO_EFFECT",
});

impl From<StatusUpdateKind> for CommandStatus {
    fn from(kind: StatusUpdateKind) -> Self {
        match kind {
            StatusUpdateKind::Sent => CommandStatus::Sent,
            StatusUpdateKind::Ack => CommandStatus::Ack,
            StatusUpdateKind::Done => CommandStatus::Done,
            StatusUpdateKind::Error => CommandStatus::Error,
            StatusUpdateKind::Invalid => CommandStatus::Invalid,
            StatusUpdateKind::Busy => CommandStatus::Busy,
            StatusUpdateKind::NoEffect => CommandStatus::NoEffect,
        }
    }
}

impl TryFrom<CommandStatus> for StatusUpdateKind {
    type Error = ParseError;

    fn try_from(status: CommandStatus) -> Result<Self, ParseError> {
        status.as_str().parse()
    }
}

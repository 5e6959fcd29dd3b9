//! JSON payload codec for bridge events
//!
//! The bridge forwards node payloads as JSON documents. This module enforces
//! a size limit before parsing and rejects events that cannot be routed
//! (empty `cmd_id`), so nothing malformed reaches the store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{CommandFinished, NewAlert, NewCommand, NodeAck, NodeStatus};

/// Maximum payload size (64 KiB) to prevent memory exhaustion
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),

    #[error("Payload has an empty cmd_id")]
    MissingCommandId,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    Ok(serde_json::from_slice(payload)?)
}

fn require_cmd_id(cmd_id: &str) -> Result<(), CodecError> {
    if cmd_id.trim().is_empty() {
        return Err(CodecError::MissingCommandId);
    }
    Ok(())
}

/// Decode a node acknowledgment
pub fn decode_ack(payload: &[u8]) -> Result<NodeAck, CodecError> {
    let ack: NodeAck = decode(payload)?;
    require_cmd_id(&ack.cmd_id)?;
    Ok(ack)
}

/// Decode a node status event
pub fn decode_status(payload: &[u8]) -> Result<NodeStatus, CodecError> {
    let status: NodeStatus = decode(payload)?;
    require_cmd_id(&status.cmd_id)?;
    Ok(status)
}

/// Decode a command creation request
pub fn decode_command(payload: &[u8]) -> Result<NewCommand, CodecError> {
    let command: NewCommand = decode(payload)?;
    require_cmd_id(&command.cmd_id)?;
    Ok(command)
}

/// Decode an alert creation request
pub fn decode_alert(payload: &[u8]) -> Result<NewAlert, CodecError> {
    decode(payload)
}

/// Encode a "command finished" notification for the UI/event layer
pub fn encode_finished(event: &CommandFinished) -> Result<Vec<u8>, CodecError> {
    encode(event)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(bytes.len()));
    }
    Ok(bytes)
}

//! Feed bridge and detector payloads into the core by hand

use super::transition_json;
use hydrolink_server::{DeliveryCore, IngestOutcome};
use hydrolink_shared::codec;
use serde_json::{json, Value};

pub async fn ingest_command(core: &DeliveryCore, payload: &[u8]) -> anyhow::Result<Value> {
    let new = codec::decode_command(payload)?;
    let enqueued = core.lifecycle.enqueue(&new).await?;
    Ok(json!({
        "created": enqueued.is_created(),
        "command": enqueued.command(),
    }))
}

pub async fn ingest_ack(core: &DeliveryCore, payload: &[u8]) -> anyhow::Result<Value> {
    let outcome = core.ingest.handle_ack_payload(payload).await?;
    Ok(outcome_json(&outcome))
}

pub async fn ingest_status(core: &DeliveryCore, payload: &[u8]) -> anyhow::Result<Value> {
    let outcome = core.ingest.handle_status_payload(payload).await?;
    Ok(outcome_json(&outcome))
}

pub async fn ingest_alert(core: &DeliveryCore, payload: &[u8]) -> anyhow::Result<Value> {
    let alert = codec::decode_alert(payload)?;
    let row = core.alert_queue.enqueue(&alert).await?;
    Ok(serde_json::to_value(row)?)
}

fn outcome_json(outcome: &IngestOutcome) -> Value {
    match outcome {
        IngestOutcome::Applied(transition) => transition_json(transition),
        IngestOutcome::Deferred { duplicate } => {
            json!({"result": "deferred", "duplicate": duplicate})
        }
        IngestOutcome::Rejected { reason } => json!({"result": "rejected", "reason": reason}),
    }
}

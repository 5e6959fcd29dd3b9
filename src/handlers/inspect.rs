//! Read-only views over commands and queues

use hydrolink_server::DeliveryCore;
use serde_json::{json, Value};

pub async fn show_command(core: &DeliveryCore, cmd_id: &str) -> anyhow::Result<Value> {
    let command = core.lifecycle.get(cmd_id).await?;
    let buffered = core.status_queue.pending_for(cmd_id).await?;
    let overrides = core.lifecycle.list_overrides(cmd_id).await?;
    Ok(json!({
        "command": command,
        "buffered_status_updates": buffered,
        "overrides": overrides,
    }))
}

pub async fn show_acks(core: &DeliveryCore, cmd_id: &str) -> anyhow::Result<Value> {
    let acks = core.lifecycle.list_acks(cmd_id).await?;
    Ok(serde_json::to_value(acks)?)
}

pub async fn show_zone_events(core: &DeliveryCore, zone_id: i64) -> anyhow::Result<Value> {
    let events = core.lifecycle.zone_events(zone_id).await?;
    Ok(serde_json::to_value(events)?)
}

pub async fn show_depth(core: &DeliveryCore) -> anyhow::Result<Value> {
    let alerts = core.alert_queue.depth().await?;
    let status_updates = core.status_queue.depth().await?;
    Ok(json!({
        "alerts": alerts,
        "status_updates": status_updates,
    }))
}

pub async fn show_alert_dlq(core: &DeliveryCore, limit: u32) -> anyhow::Result<Value> {
    let rows = core.alert_queue.list_dlq(limit).await?;
    Ok(serde_json::to_value(rows)?)
}

pub async fn show_status_dlq(core: &DeliveryCore, limit: u32) -> anyhow::Result<Value> {
    let rows = core.status_queue.list_dlq(limit).await?;
    Ok(serde_json::to_value(rows)?)
}

//! One-shot worker runs and operator corrections

use super::transition_json;
use hydrolink_server::DeliveryCore;
use hydrolink_shared::{CommandStatus, ReplayRequest};
use serde_json::{json, Value};
use tracing::info;

pub async fn sweep(core: &DeliveryCore) -> anyhow::Result<Value> {
    let report = core.sweeper.sweep().await?;
    info!("Sweep: {}", report);
    Ok(json!({ "sweep": report }))
}

pub async fn dispatch(core: &DeliveryCore) -> anyhow::Result<Value> {
    let report = core.dispatcher.dispatch().await?;
    info!("Dispatch: {}", report);
    Ok(json!({ "dispatch": report }))
}

pub async fn apply(core: &DeliveryCore) -> anyhow::Result<Value> {
    let report = core.applier.apply().await?;
    info!("Apply: {}", report);
    Ok(json!({ "apply": report }))
}

pub async fn replay(core: &DeliveryCore, older_than_hours: u32, limit: u32) -> anyhow::Result<Value> {
    let request = ReplayRequest {
        older_than_hours,
        limit,
    };
    let report = core.replay.replay(request).await?;
    info!("Replay ({}h, limit {}): {}", older_than_hours, limit, report);
    Ok(json!({ "replay": report }))
}

pub async fn override_status(
    core: &DeliveryCore,
    cmd_id: &str,
    status: CommandStatus,
    reason: &str,
) -> anyhow::Result<Value> {
    let outcome = core.lifecycle.override_status(cmd_id, status, reason).await?;
    Ok(transition_json(&outcome))
}

//! Entry points for node acks and status events relayed by the bridge
//!
//! Events are applied directly when possible. When the command is not there
//! yet (or the store is briefly unavailable) the event is buffered in the
//! status-update queue instead of being dropped.

use crate::command::{CommandLifecycle, TransitionOutcome};
use crate::error::{DeliveryError, Result};
use crate::status_updates::{Buffered, StatusUpdateQueue};
use hydrolink_shared::{codec, NodeAck, NodeStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Applied (or recognised as redelivered/stale) against the command
    Applied(TransitionOutcome),
    /// Buffered for the status-update applier; `duplicate` if already waiting
    Deferred { duplicate: bool },
    /// Refused by the state machine; nothing was stored
    Rejected { reason: String },
}

pub struct Ingest {
    lifecycle: Arc<CommandLifecycle>,
    status_queue: StatusUpdateQueue,
}

impl Ingest {
    pub fn new(lifecycle: Arc<CommandLifecycle>, status_queue: StatusUpdateQueue) -> Self {
        Self {
            lifecycle,
            status_queue,
        }
    }

    pub async fn handle_ack(&self, ack: &NodeAck) -> Result<IngestOutcome> {
        match self.lifecycle.apply_ack(ack).await {
            Ok(outcome) => Ok(IngestOutcome::Applied(outcome)),
            Err(e) if e.is_transient() => {
                info!("Deferring {} ack for {}: {}", ack.ack_type, ack.cmd_id, e);
                self.defer(&ack.to_status_event()).await
            }
            Err(e @ DeliveryError::InvalidTransition { .. }) => Ok(IngestOutcome::Rejected {
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn handle_status(&self, event: &NodeStatus) -> Result<IngestOutcome> {
        match self.lifecycle.apply_status_update(event).await {
            Ok(outcome) => Ok(IngestOutcome::Applied(outcome)),
            Err(e) if e.is_transient() => {
                info!("Deferring {} update for {}: {}", event.status, event.cmd_id, e);
                self.defer(event).await
            }
            Err(e @ DeliveryError::InvalidTransition { .. }) => {
                warn!("Rejected {} update for {}: {}", event.status, event.cmd_id, e);
                Ok(IngestOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Decode and handle a raw ack payload from the bridge
    pub async fn handle_ack_payload(&self, payload: &[u8]) -> Result<IngestOutcome> {
        let ack = codec::decode_ack(payload)
            .map_err(|e| DeliveryError::Validation(format!("Bad ack payload: {}", e)))?;
        self.handle_ack(&ack).await
    }

    /// Decode and handle a raw status payload from the bridge
    pub async fn handle_status_payload(&self, payload: &[u8]) -> Result<IngestOutcome> {
        let event = codec::decode_status(payload)
            .map_err(|e| DeliveryError::Validation(format!("Bad status payload: {}", e)))?;
        self.handle_status(&event).await
    }

    async fn defer(&self, event: &NodeStatus) -> Result<IngestOutcome> {
        let buffered = self.status_queue.enqueue(event).await?;
        Ok(IngestOutcome::Deferred {
            duplicate: matches!(buffered, Buffered::Duplicate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LogEvents;
    use crate::store::Store;
    use hydrolink_shared::{
        AckType, CommandStatus, ManualClock, NewCommand, RetryPolicy, StatusUpdateKind,
    };

    async fn setup() -> (Ingest, Arc<CommandLifecycle>, StatusUpdateQueue) {
        let store = Store::open_in_memory().await.expect("open failed");
        let clock = Arc::new(ManualClock::new(0));
        let lifecycle = Arc::new(CommandLifecycle::new(
            store.clone(),
            clock.clone(),
            Arc::new(LogEvents),
        ));
        let queue = StatusUpdateQueue::new(store, clock, RetryPolicy::status_updates());
        (
            Ingest::new(lifecycle.clone(), queue.clone()),
            lifecycle,
            queue,
        )
    }

    #[tokio::test]
    async fn test_ack_for_unknown_command_is_deferred() {
        let (ingest, _lifecycle, queue) = setup().await;

        let ack = NodeAck::new("cmd-5", AckType::Executed).with_telemetry(Some(0.8), None);
        let outcome = ingest.handle_ack(&ack).await.expect("ingest failed");
        assert_eq!(outcome, IngestOutcome::Deferred { duplicate: false });

        let again = ingest.handle_ack(&ack).await.expect("ingest failed");
        assert_eq!(again, IngestOutcome::Deferred { duplicate: true });

        let pending = queue.pending_for("cmd-5").await.expect("list failed");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, StatusUpdateKind::Done);
        assert_eq!(pending[0].details.0["ack_type"], "executed");
    }

    #[tokio::test]
    async fn test_ack_on_terminal_command_is_rejected() {
        let (ingest, lifecycle, queue) = setup().await;
        lifecycle
            .enqueue(&NewCommand::new("cmd-1", "valve_open", "scheduler"))
            .await
            .expect("enqueue failed");
        lifecycle
            .mark_send_failed("cmd-1", "broker down")
            .await
            .expect("send failed write failed");

        let outcome = ingest
            .handle_ack(&NodeAck::new("cmd-1", AckType::Accepted))
            .await
            .expect("ingest failed");
        assert!(matches!(outcome, IngestOutcome::Rejected { .. }));
        assert_eq!(queue.depth().await.expect("depth failed").live, 0);
        assert_eq!(
            lifecycle.get_status("cmd-1").await.expect("status failed"),
            CommandStatus::SendFailed
        );
    }

    #[tokio::test]
    async fn test_status_payload_applies_directly() {
        let (ingest, lifecycle, _queue) = setup().await;
        lifecycle
            .enqueue(&NewCommand::new("cmd-1", "valve_open", "scheduler"))
            .await
            .expect("enqueue failed");

        let outcome = ingest
            .handle_status_payload(br#"{"cmd_id":"cmd-1","status":"ACK"}"#)
            .await
            .expect("ingest failed");
        assert!(matches!(outcome, IngestOutcome::Applied(o) if o.is_applied()));

        let bad = ingest.handle_status_payload(b"not json").await;
        assert!(matches!(bad, Err(DeliveryError::Validation(_))));
    }
}

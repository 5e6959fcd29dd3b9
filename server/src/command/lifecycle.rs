//! Command lifecycle manager
//!
//! Owns every status write on `commands`. Each transition is a conditional
//! update against the status the caller observed; when a concurrent writer
//! wins, the command is re-read and the transition re-planned. The "command
//! finished" notification is published only by the writer whose update moved
//! the command into a terminal status.

use super::notify::{publish_finished, CommandEvents};
use crate::error::{DeliveryError, Result};
use crate::store::commands::{self, AckRecord, StatusWrite};
use crate::store::{Command, CommandAck, CommandOverride, Store, ZoneEvent};
use hydrolink_shared::state_machine::{self, Transition};
use hydrolink_shared::{delivery, AckType, Clock, CommandStatus, NewCommand, NodeAck, NodeStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_CMD_ID_LEN: usize = 128;
const OVERRIDE_ERROR_CODE: &str = "OPERATOR_OVERRIDE";

/// Result of [`CommandLifecycle::enqueue`]
#[derive(Debug, Clone)]
pub enum Enqueued {
    /// New QUEUED command
    Created(Command),
    /// `cmd_id` was already known; the stored command is returned untouched
    Existing(Command),
}

impl Enqueued {
    pub fn command(&self) -> &Command {
        match self {
            Enqueued::Created(c) | Enqueued::Existing(c) => c,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Enqueued::Created(_))
    }
}

/// What a status write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status moved forward
    Applied {
        from: CommandStatus,
        to: CommandStatus,
    },
    /// Command was already in the requested status
    Unchanged { status: CommandStatus },
    /// Command is terminal or already past the requested status
    Superseded {
        current: CommandStatus,
        requested: CommandStatus,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    /// Status of the command after the call
    pub fn status(&self) -> CommandStatus {
        match *self {
            TransitionOutcome::Applied { to, .. } => to,
            TransitionOutcome::Unchanged { status } => status,
            TransitionOutcome::Superseded { current, .. } => current,
        }
    }
}

/// Extra column values carried by one transition
#[derive(Debug, Default)]
struct Change {
    ack: Option<AckRecord>,
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Applies lifecycle events to commands through the store
pub struct CommandLifecycle {
    store: Store,
    clock: Arc<dyn Clock>,
    events: Arc<dyn CommandEvents>,
}

impl CommandLifecycle {
    pub fn new(store: Store, clock: Arc<dyn Clock>, events: Arc<dyn CommandEvents>) -> Self {
        Self {
            store,
            clock,
            events,
        }
    }

    /// Create a command in QUEUED
    ///
    /// A repeated `cmd_id` is a no-op that hands back the stored command.
    pub async fn enqueue(&self, new: &NewCommand) -> Result<Enqueued> {
        validate_new_command(new)?;

        let now = self.clock.now_ms();
        if let Some(command) = commands::insert(self.store.pool(), new, now).await? {
            info!(
                "Command {} queued: {} (zone={:?} node={:?} channel={:?})",
                command.cmd_id, command.cmd, command.zone_id, command.node_id, command.channel
            );
            return Ok(Enqueued::Created(command));
        }

        let existing = commands::find(self.store.pool(), &new.cmd_id)
            .await?
            .ok_or_else(|| DeliveryError::Contention(new.cmd_id.clone()))?;
        info!(
            "Command {} already exists in {}, enqueue ignored",
            existing.cmd_id, existing.status
        );
        Ok(Enqueued::Existing(existing))
    }

    /// Bridge published the command to the node
    ///
    /// Only a QUEUED command can be marked SENT; anything else, including a
    /// repeated call, is an `InvalidTransition` and leaves the row untouched.
    pub async fn mark_sent(&self, cmd_id: &str) -> Result<TransitionOutcome> {
        match self
            .transition(cmd_id, CommandStatus::Sent, Change::default())
            .await?
        {
            outcome @ TransitionOutcome::Applied { .. } => Ok(outcome),
            rejected => {
                let current = rejected.status();
                warn!("Rejected SENT for {}: command already {}", cmd_id, current);
                Err(DeliveryError::InvalidTransition {
                    cmd_id: cmd_id.to_string(),
                    from: current,
                    to: CommandStatus::Sent,
                })
            }
        }
    }

    /// Bridge could not publish the command
    pub async fn mark_send_failed(&self, cmd_id: &str, error: &str) -> Result<TransitionOutcome> {
        let change = Change {
            ack: None,
            error_code: Some(CommandStatus::SendFailed.as_str().to_string()),
            error_message: Some(error.to_string()),
        };
        self.transition(cmd_id, CommandStatus::SendFailed, change)
            .await
    }

    /// Apply a node acknowledgment
    ///
    /// Acks for a command that is already terminal are rejected with
    /// `InvalidTransition`. A redelivered ack for the current status is a
    /// no-op that still records the ack phase if it was not logged yet.
    pub async fn apply_ack(&self, ack: &NodeAck) -> Result<TransitionOutcome> {
        let target = ack.target_status();
        let metadata = ack.metadata.clone().unwrap_or_else(|| json!({}));

        if target.is_success() && !ack.is_corroborated() {
            debug!("Command {} {} without telemetry", ack.cmd_id, ack.ack_type);
        }

        let change = Change {
            error_code: failure_code(target, metadata.get("error_code").and_then(Value::as_str)),
            error_message: ack.error_message.clone().filter(|_| !target.is_success()),
            ack: Some(AckRecord {
                ack_type: ack.ack_type,
                measured_current: ack.measured_current,
                measured_flow: ack.measured_flow,
                error_message: ack.error_message.clone(),
                metadata,
            }),
        };

        match self.transition(&ack.cmd_id, target, change).await? {
            TransitionOutcome::Superseded { current, requested } => {
                warn!(
                    "Rejected {} ack for {}: command already {}",
                    ack.ack_type, ack.cmd_id, current
                );
                Err(DeliveryError::InvalidTransition {
                    cmd_id: ack.cmd_id.clone(),
                    from: current,
                    to: requested,
                })
            }
            outcome => Ok(outcome),
        }
    }

    /// Apply a node status event
    ///
    /// A stale event (command terminal or already past it) comes back as
    /// `Superseded` rather than an error; the reconciliation queue discards it.
    pub async fn apply_status_update(&self, event: &NodeStatus) -> Result<TransitionOutcome> {
        if event.cmd_id.trim().is_empty() {
            return Err(DeliveryError::Validation("cmd_id must not be empty".into()));
        }

        let target = CommandStatus::from(event.status);
        let error_message = event.detail_str("error_message").map(str::to_string);

        // Prefer the phase named by the bridge when it agrees with the status
        let ack_type = event
            .detail_str("ack_type")
            .and_then(|t| t.parse::<AckType>().ok())
            .filter(|t| state_machine::ack_status(*t, error_message.is_some()) == target)
            .or_else(|| state_machine::status_ack_type(target));

        let change = Change {
            error_code: failure_code(target, event.detail_str("error_code")),
            error_message: error_message.clone().filter(|_| !target.is_success()),
            ack: ack_type.map(|ack_type| AckRecord {
                ack_type,
                measured_current: event.detail_f64("measured_current"),
                measured_flow: event.detail_f64("measured_flow"),
                error_message,
                metadata: event.details.clone(),
            }),
        };

        self.transition(&event.cmd_id, target, change).await
    }

    /// Operator override: force a command into `status`
    ///
    /// Bypasses the forward-only rule. The finish notification is published
    /// only when the override moves a live command into a terminal status.
    pub async fn override_status(
        &self,
        cmd_id: &str,
        status: CommandStatus,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        if reason.trim().is_empty() {
            return Err(DeliveryError::Validation(
                "override reason must not be empty".into(),
            ));
        }

        for _ in 0..delivery::MAX_CAS_RETRIES {
            let command = self.get(cmd_id).await?;
            if command.status == status {
                return Ok(TransitionOutcome::Unchanged { status });
            }

            let now = self.clock.now_ms();
            let change = Change {
                ack: None,
                error_code: failure_code(status, Some(OVERRIDE_ERROR_CODE)),
                error_message: None,
            };
            let write = status_write(&command, status, &change, now);

            let mut tx = self.store.begin().await?;
            let Some(updated) = commands::override_status_if(
                &mut *tx,
                command.id,
                command.status,
                status,
                &write,
                now,
            )
            .await?
            else {
                tx.rollback().await?;
                debug!("Override of {} raced another writer, retrying", cmd_id);
                continue;
            };
            commands::insert_override(&mut *tx, command.id, command.status, status, reason, now)
                .await?;
            tx.commit().await?;

            warn!(
                "Command {} overridden: {} -> {} ({})",
                cmd_id, command.status, status, reason
            );
            if status.is_terminal() && !command.status.is_terminal() {
                publish_finished(self.events.as_ref(), &updated.finished_event()).await;
            }
            return Ok(TransitionOutcome::Applied {
                from: command.status,
                to: status,
            });
        }

        Err(DeliveryError::Contention(cmd_id.to_string()))
    }

    /// Look up a command by id
    pub async fn get(&self, cmd_id: &str) -> Result<Command> {
        commands::find(self.store.pool(), cmd_id)
            .await?
            .ok_or_else(|| DeliveryError::CommandNotFound(cmd_id.to_string()))
    }

    pub async fn get_status(&self, cmd_id: &str) -> Result<CommandStatus> {
        Ok(self.get(cmd_id).await?.status)
    }

    /// Ack log of a command, oldest first
    pub async fn list_acks(&self, cmd_id: &str) -> Result<Vec<CommandAck>> {
        let command = self.get(cmd_id).await?;
        commands::list_acks(self.store.pool(), command.id).await
    }

    /// Operator overrides applied to a command, oldest first
    pub async fn list_overrides(&self, cmd_id: &str) -> Result<Vec<CommandOverride>> {
        let command = self.get(cmd_id).await?;
        commands::list_overrides(self.store.pool(), command.id).await
    }

    /// Zone timeline, oldest first
    pub async fn zone_events(&self, zone_id: i64) -> Result<Vec<ZoneEvent>> {
        commands::list_zone_events(self.store.pool(), zone_id).await
    }

    async fn transition(
        &self,
        cmd_id: &str,
        target: CommandStatus,
        change: Change,
    ) -> Result<TransitionOutcome> {
        for _ in 0..delivery::MAX_CAS_RETRIES {
            let command = self.get(cmd_id).await?;

            match state_machine::plan(command.status, target) {
                Transition::Unchanged => {
                    if let Some(ack) = &change.ack {
                        let now = self.clock.now_ms();
                        if commands::insert_ack(self.store.pool(), command.id, ack, now).await? {
                            debug!("Logged {} ack for {} (status unchanged)", ack.ack_type, cmd_id);
                        }
                    }
                    debug!("Command {} already {}", cmd_id, target);
                    return Ok(TransitionOutcome::Unchanged { status: target });
                }
                Transition::Superseded { current } => {
                    debug!("Command {} is {}, ignoring {}", cmd_id, current, target);
                    return Ok(TransitionOutcome::Superseded {
                        current,
                        requested: target,
                    });
                }
                Transition::Invalid { from, to } => {
                    warn!("Invalid transition for {}: {} -> {}", cmd_id, from, to);
                    return Err(DeliveryError::InvalidTransition {
                        cmd_id: cmd_id.to_string(),
                        from,
                        to,
                    });
                }
                Transition::Advance => {}
            }

            let now = self.clock.now_ms();
            let write = status_write(&command, target, &change, now);

            let mut tx = self.store.begin().await?;
            let Some(updated) = commands::update_status_if(
                &mut *tx,
                command.id,
                command.status,
                target,
                &write,
                now,
            )
            .await?
            else {
                tx.rollback().await?;
                debug!("Command {} changed under us, re-reading", cmd_id);
                continue;
            };
            if let Some(ack) = &change.ack {
                commands::insert_ack(&mut *tx, command.id, ack, now).await?;
            }
            tx.commit().await?;

            info!("Command {}: {} -> {}", cmd_id, command.status, target);

            if target.is_terminal() {
                publish_finished(self.events.as_ref(), &updated.finished_event()).await;
            }

            return Ok(TransitionOutcome::Applied {
                from: command.status,
                to: target,
            });
        }

        warn!("Giving up on {} after {} conflicting writes", cmd_id, delivery::MAX_CAS_RETRIES);
        Err(DeliveryError::Contention(cmd_id.to_string()))
    }
}

fn validate_new_command(new: &NewCommand) -> Result<()> {
    let cmd_id = new.cmd_id.trim();
    if cmd_id.is_empty() {
        return Err(DeliveryError::Validation("cmd_id must not be empty".into()));
    }
    if cmd_id.len() != new.cmd_id.len() || new.cmd_id.len() > MAX_CMD_ID_LEN {
        return Err(DeliveryError::Validation(format!(
            "cmd_id must be at most {} characters without surrounding whitespace",
            MAX_CMD_ID_LEN
        )));
    }
    if new.cmd.trim().is_empty() {
        return Err(DeliveryError::Validation("cmd must not be empty".into()));
    }
    if new.source.trim().is_empty() {
        return Err(DeliveryError::Validation("source must not be empty".into()));
    }
    if !new.params.is_object() {
        return Err(DeliveryError::Validation("params must be a JSON object".into()));
    }
    Ok(())
}

/// Error code stored for a failure status; success statuses carry none
fn failure_code(status: CommandStatus, reported: Option<&str>) -> Option<String> {
    if !status.is_terminal() || status.is_success() {
        return None;
    }
    Some(
        reported
            .filter(|code| !code.trim().is_empty())
            .unwrap_or(status.as_str())
            .to_string(),
    )
}

/// Timestamps and result columns for moving `command` into `target`
fn status_write(command: &Command, target: CommandStatus, change: &Change, now: i64) -> StatusWrite {
    let mut write = StatusWrite {
        error_code: change.error_code.clone(),
        error_message: change.error_message.clone(),
        ..StatusWrite::default()
    };

    match target {
        CommandStatus::Queued => {}
        CommandStatus::Sent => {
            if command.sent_at.is_none() {
                write.sent_at = Some(now);
            }
        }
        CommandStatus::Ack => write.ack_at = Some(now),
        terminal => {
            write.finished_at = Some(now);
            write.result_code = Some(state_machine::result_code(terminal));
            write.duration_ms = Some(command.elapsed_ms(now));
            if !terminal.is_success() {
                write.failed_at = Some(now);
            }
        }
    }

    write
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::notify::ChannelEvents;
    use hydrolink_shared::{CommandFinished, ManualClock, StatusUpdateKind};
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup() -> (
        CommandLifecycle,
        Arc<ManualClock>,
        UnboundedReceiver<CommandFinished>,
    ) {
        let store = Store::open_in_memory().await.expect("open failed");
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (events, rx) = ChannelEvents::new();
        let lifecycle = CommandLifecycle::new(store, clock.clone(), Arc::new(events));
        (lifecycle, clock, rx)
    }

    fn valve_open(cmd_id: &str) -> NewCommand {
        NewCommand::new(cmd_id, "valve_open", "scheduler")
            .with_zone(7)
            .with_target(3, "valve-1")
            .with_params(json!({"duration_s": 600}))
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let (lifecycle, _clock, _rx) = setup().await;

        let first = lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        assert!(first.is_created());
        assert_eq!(first.command().status, CommandStatus::Queued);

        let second = lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        assert!(!second.is_created());
        assert_eq!(second.command().id, first.command().id);
    }

    #[tokio::test]
    async fn test_enqueue_validation() {
        let (lifecycle, _clock, _rx) = setup().await;

        let empty_id = NewCommand::new("", "valve_open", "scheduler");
        assert!(matches!(
            lifecycle.enqueue(&empty_id).await,
            Err(DeliveryError::Validation(_))
        ));

        let bad_params = valve_open("cmd-1").with_params(json!([1, 2]));
        assert!(matches!(
            lifecycle.enqueue(&bad_params).await,
            Err(DeliveryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_two_phase_ack_flow() {
        let (lifecycle, clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");

        let sent = lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
        assert!(sent.is_applied());

        clock.advance_ms(200);
        let accepted = lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Accepted))
            .await
            .expect("ack failed");
        assert_eq!(accepted.status(), CommandStatus::Ack);

        clock.advance_ms(1_800);
        let executed = NodeAck::new("cmd-1", AckType::Executed).with_telemetry(Some(1.2), Some(3.4));
        let done = lifecycle.apply_ack(&executed).await.expect("ack failed");
        assert_eq!(
            done,
            TransitionOutcome::Applied {
                from: CommandStatus::Ack,
                to: CommandStatus::Done
            }
        );

        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.status, CommandStatus::Done);
        assert_eq!(command.result_code, Some(0));
        assert_eq!(command.duration_ms, Some(2_000));
        assert!(command.ack_at.is_some());
        assert!(command.finished_at.is_some());
        assert!(command.error_code.is_none());

        let finished = rx.try_recv().expect("missing finish notification");
        assert_eq!(finished.status, CommandStatus::Done);
        assert_eq!(finished.result_code, 0);
        assert_eq!(finished.zone_id, Some(7));
    }

    #[tokio::test]
    async fn test_redelivered_ack_notifies_once() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let executed = NodeAck::new("cmd-1", AckType::Executed);
        lifecycle.apply_ack(&executed).await.expect("ack failed");
        let again = lifecycle.apply_ack(&executed).await.expect("redelivery failed");
        assert_eq!(
            again,
            TransitionOutcome::Unchanged {
                status: CommandStatus::Done
            }
        );

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second notification published");

        let acks = lifecycle.list_acks("cmd-1").await.expect("list failed");
        assert_eq!(acks.len(), 1);
    }

    #[tokio::test]
    async fn test_verified_after_done_keeps_status_and_logs_ack() {
        let (lifecycle, _clock, _rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Accepted))
            .await
            .expect("ack failed");
        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Executed))
            .await
            .expect("ack failed");

        let verified = NodeAck::new("cmd-1", AckType::Verified).with_telemetry(None, Some(2.5));
        let outcome = lifecycle.apply_ack(&verified).await.expect("verified failed");
        assert_eq!(outcome.status(), CommandStatus::Done);

        let phases: Vec<AckType> = lifecycle
            .list_acks("cmd-1")
            .await
            .expect("list failed")
            .into_iter()
            .map(|a| a.ack_type)
            .collect();
        assert_eq!(
            phases,
            vec![AckType::Accepted, AckType::Executed, AckType::Verified]
        );
    }

    #[tokio::test]
    async fn test_ack_on_terminal_command_is_rejected() {
        let (lifecycle, _clock, _rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Executed))
            .await
            .expect("ack failed");

        let result = lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Error).with_error("valve jammed"))
            .await;
        assert!(matches!(
            result,
            Err(DeliveryError::InvalidTransition {
                from: CommandStatus::Done,
                to: CommandStatus::Error,
                ..
            })
        ));
        assert_eq!(
            lifecycle.get_status("cmd-1").await.expect("status failed"),
            CommandStatus::Done
        );
    }

    #[tokio::test]
    async fn test_executed_with_error_resolves_to_error() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let ack = NodeAck::new("cmd-1", AckType::Executed).with_error("pressure too low");
        lifecycle.apply_ack(&ack).await.expect("ack failed");

        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.status, CommandStatus::Error);
        assert_eq!(command.error_code.as_deref(), Some("ERROR"));
        assert_eq!(command.error_message.as_deref(), Some("pressure too low"));
        assert_eq!(command.result_code, Some(1));
        assert!(command.failed_at.is_some());

        let finished = rx.try_recv().expect("missing finish notification");
        assert_eq!(finished.result_code, 1);
    }

    #[tokio::test]
    async fn test_ack_before_sent_write() {
        let (lifecycle, _clock, _rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");

        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Accepted))
            .await
            .expect("ack failed");

        let late_sent = lifecycle.mark_sent("cmd-1").await;
        assert!(matches!(
            late_sent,
            Err(DeliveryError::InvalidTransition {
                from: CommandStatus::Ack,
                to: CommandStatus::Sent,
                ..
            })
        ));
        assert_eq!(
            lifecycle.get_status("cmd-1").await.expect("status failed"),
            CommandStatus::Ack
        );
    }

    #[tokio::test]
    async fn test_mark_sent_only_from_queued() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let repeated = lifecycle.mark_sent("cmd-1").await;
        assert!(matches!(
            repeated,
            Err(DeliveryError::InvalidTransition {
                from: CommandStatus::Sent,
                to: CommandStatus::Sent,
                ..
            })
        ));

        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Executed))
            .await
            .expect("ack failed");
        let after_done = lifecycle.mark_sent("cmd-1").await;
        assert!(matches!(
            after_done,
            Err(DeliveryError::InvalidTransition {
                from: CommandStatus::Done,
                to: CommandStatus::Sent,
                ..
            })
        ));

        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.status, CommandStatus::Done);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_verified_without_telemetry_still_done() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let verified = NodeAck::new("cmd-1", AckType::Verified);
        assert!(!verified.is_corroborated());
        let outcome = lifecycle.apply_ack(&verified).await.expect("verified failed");
        assert_eq!(outcome.status(), CommandStatus::Done);

        let acks = lifecycle.list_acks("cmd-1").await.expect("list failed");
        assert_eq!(acks[0].measured_current, None);
        assert_eq!(acks[0].measured_flow, None);
        assert_eq!(rx.try_recv().expect("missing notification").result_code, 0);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (lifecycle, _clock, _rx) = setup().await;
        let result = lifecycle
            .apply_ack(&NodeAck::new("nope", AckType::Accepted))
            .await;
        assert!(matches!(result, Err(DeliveryError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn test_send_failed_only_from_queued() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.enqueue(&valve_open("cmd-2")).await.expect("enqueue failed");

        lifecycle
            .mark_send_failed("cmd-1", "broker unreachable")
            .await
            .expect("send failed write failed");
        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.status, CommandStatus::SendFailed);
        assert_eq!(command.error_code.as_deref(), Some("SEND_FAILED"));
        assert!(rx.try_recv().is_ok());

        lifecycle.mark_sent("cmd-2").await.expect("mark_sent failed");
        let result = lifecycle.mark_send_failed("cmd-2", "late").await;
        assert!(matches!(result, Err(DeliveryError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_status_update_reads_error_details() {
        let (lifecycle, _clock, _rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let event = NodeStatus::new("cmd-1", StatusUpdateKind::Error).with_details(json!({
            "error_code": "E_STALL",
            "error_message": "pump stalled",
        }));
        let outcome = lifecycle
            .apply_status_update(&event)
            .await
            .expect("status update failed");
        assert!(outcome.is_applied());

        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.error_code.as_deref(), Some("E_STALL"));
        assert_eq!(command.error_message.as_deref(), Some("pump stalled"));

        let acks = lifecycle.list_acks("cmd-1").await.expect("list failed");
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].ack_type, AckType::Error);
    }

    #[tokio::test]
    async fn test_stale_status_update_is_superseded() {
        let (lifecycle, _clock, _rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
        lifecycle
            .apply_status_update(&NodeStatus::new("cmd-1", StatusUpdateKind::Done))
            .await
            .expect("done failed");

        let outcome = lifecycle
            .apply_status_update(&NodeStatus::new("cmd-1", StatusUpdateKind::Ack))
            .await
            .expect("stale update failed");
        assert!(matches!(outcome, TransitionOutcome::Superseded { .. }));
        assert_eq!(
            lifecycle.get_status("cmd-1").await.expect("status failed"),
            CommandStatus::Done
        );
    }

    #[tokio::test]
    async fn test_override_status() {
        let (lifecycle, _clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");

        let outcome = lifecycle
            .override_status("cmd-1", CommandStatus::NoEffect, "valve already open")
            .await
            .expect("override failed");
        assert!(outcome.is_applied());
        assert!(rx.try_recv().is_ok());

        // Terminal to terminal: corrected, no second notification
        lifecycle
            .override_status("cmd-1", CommandStatus::Done, "confirmed on site")
            .await
            .expect("override failed");
        assert_eq!(
            lifecycle.get_status("cmd-1").await.expect("status failed"),
            CommandStatus::Done
        );
        assert!(rx.try_recv().is_err());

        let empty_reason = lifecycle
            .override_status("cmd-1", CommandStatus::Error, " ")
            .await;
        assert!(matches!(empty_reason, Err(DeliveryError::Validation(_))));

        let overrides = lifecycle.list_overrides("cmd-1").await.expect("list failed");
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[0].from_status, CommandStatus::Sent);
        assert_eq!(overrides[1].to_status, CommandStatus::Done);
        assert_eq!(overrides[1].reason, "confirmed on site");
    }

    #[tokio::test]
    async fn test_override_to_success_clears_failure_fields() {
        let (lifecycle, clock, mut rx) = setup().await;
        lifecycle.enqueue(&valve_open("cmd-1")).await.expect("enqueue failed");
        lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
        lifecycle
            .apply_ack(&NodeAck::new("cmd-1", AckType::Error).with_error("no flow"))
            .await
            .expect("ack failed");
        assert_eq!(
            rx.try_recv().expect("missing notification").status,
            CommandStatus::Error
        );

        clock.advance_ms(1_000);
        lifecycle
            .override_status("cmd-1", CommandStatus::Done, "confirmed")
            .await
            .expect("override failed");

        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.status, CommandStatus::Done);
        assert_eq!(command.result_code, Some(0));
        assert!(command.error_code.is_none());
        assert!(command.error_message.is_none());
        assert!(command.failed_at.is_none());
        assert!(command.finished_at.is_some());

        // Failure override carries its own code, not the node's message
        lifecycle
            .override_status("cmd-1", CommandStatus::Invalid, "wrong valve")
            .await
            .expect("override failed");
        let command = lifecycle.get("cmd-1").await.expect("get failed");
        assert_eq!(command.error_code.as_deref(), Some("OPERATOR_OVERRIDE"));
        assert!(command.error_message.is_none());
        assert_eq!(command.result_code, Some(1));
        assert!(command.failed_at.is_some());

        let reasons: Vec<String> = lifecycle
            .list_overrides("cmd-1")
            .await
            .expect("list failed")
            .into_iter()
            .map(|o| o.reason)
            .collect();
        assert_eq!(reasons, vec!["confirmed", "wrong valve"]);
        assert!(rx.try_recv().is_err());
    }
}

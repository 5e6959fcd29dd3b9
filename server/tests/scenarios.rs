//! End-to-end delivery scenarios over the wired core

mod common;

use common::{harness, harness_with, SwitchableDelivery};
use hydrolink_server::{DeliveryConfig, IngestOutcome};
use hydrolink_shared::{
    AckType, AlertSource, AlertStatus, CommandStatus, NewAlert, NewCommand, NodeAck, NodeStatus,
    ReplayRequest, StatusUpdateKind, COMMAND_TIMEOUT_EVENT,
};
use serde_json::json;

#[tokio::test]
async fn test_unanswered_command_times_out() {
    let mut h = harness().await;
    let lifecycle = &h.core.lifecycle;

    lifecycle
        .enqueue(&NewCommand::new("cmd-1", "irrigate", "scheduler").with_zone(12))
        .await
        .expect("enqueue failed");
    lifecycle.mark_sent("cmd-1").await.expect("mark_sent failed");
    lifecycle
        .apply_ack(&NodeAck::new("cmd-1", AckType::Accepted))
        .await
        .expect("ack failed");

    h.clock.advance_minutes(6);
    let report = h.core.sweeper.sweep().await.expect("sweep failed");
    assert_eq!(report.succeeded, 1);

    let command = lifecycle.get("cmd-1").await.expect("get failed");
    assert_eq!(command.status, CommandStatus::Timeout);
    assert_eq!(command.error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(command.result_code, Some(1));

    let events = lifecycle.zone_events(12).await.expect("events failed");
    let timeouts: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == COMMAND_TIMEOUT_EVENT)
        .collect();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].payload.0["timeout_minutes"], 5);

    // A late answer cannot revive it
    let late = lifecycle
        .apply_ack(&NodeAck::new("cmd-1", AckType::Executed))
        .await;
    assert!(late.is_err());

    let finished = h.take_finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, CommandStatus::Timeout);
}

#[tokio::test]
async fn test_alert_dead_letter_and_replay() {
    let mut config = DeliveryConfig::default();
    config.alert_retry.max_attempts = 3;
    let h = harness_with(config, SwitchableDelivery::failing()).await;

    h.core
        .alert_queue
        .enqueue(
            &NewAlert::new(AlertSource::Biz, "PH_DRIFT", "dosing")
                .with_zone(3)
                .with_details(json!({"ph": 8.9})),
        )
        .await
        .expect("enqueue failed");

    for _ in 0..3 {
        let report = h.core.dispatcher.dispatch().await.expect("dispatch failed");
        assert_eq!(report.failed, 1);
        // Past the largest possible backoff
        h.clock.advance_minutes(15);
    }

    let depth = h.core.alert_queue.depth().await.expect("depth failed");
    assert_eq!((depth.live, depth.dlq), (0, 1));

    let dlq = h.core.alert_queue.list_dlq(10).await.expect("list failed");
    assert_eq!(dlq[0].attempts, 3);
    assert_eq!(dlq[0].status, AlertStatus::Dlq);
    assert_eq!(dlq[0].last_error.as_deref(), Some("downstream unavailable"));

    let report = h
        .core
        .replay
        .replay(ReplayRequest {
            older_than_hours: 0,
            limit: 100,
        })
        .await
        .expect("replay failed");
    assert_eq!(report.succeeded, 1);

    h.delivery.set_failing(false);
    let pending = h.core.alert_queue.claim_due(10, 1_000).await.expect("claim failed");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 0);
    assert_eq!(pending[0].status, AlertStatus::Pending);
    assert_eq!(pending[0].details.0["ph"], 8.9);
}

#[tokio::test]
async fn test_status_before_command_is_reconciled() {
    let mut h = harness().await;

    let outcome = h
        .core
        .ingest
        .handle_status(&NodeStatus::new("cmd-2", StatusUpdateKind::Done))
        .await
        .expect("ingest failed");
    assert_eq!(outcome, IngestOutcome::Deferred { duplicate: false });

    h.core
        .lifecycle
        .enqueue(&NewCommand::new("cmd-2", "valve_close", "scheduler"))
        .await
        .expect("enqueue failed");
    h.core.lifecycle.mark_sent("cmd-2").await.expect("mark_sent failed");

    h.clock.advance_minutes(1);
    let report = h.core.applier.apply().await.expect("apply failed");
    assert_eq!(report.succeeded, 1);

    assert_eq!(
        h.core.lifecycle.get_status("cmd-2").await.expect("status failed"),
        CommandStatus::Done
    );
    assert_eq!(h.core.status_queue.depth().await.expect("depth failed").live, 0);

    // Applied exactly once
    h.clock.advance_minutes(1);
    assert!(h.core.applier.apply().await.expect("apply failed").is_empty());
    assert_eq!(h.take_finished().len(), 1);
    assert_eq!(
        h.core.lifecycle.list_acks("cmd-2").await.expect("acks failed").len(),
        1
    );
}

#[tokio::test]
async fn test_deferred_ack_keeps_telemetry() {
    let h = harness().await;

    let ack = NodeAck::new("cmd-7", AckType::Executed).with_telemetry(Some(1.4), Some(6.0));
    h.core.ingest.handle_ack(&ack).await.expect("ingest failed");

    h.core
        .lifecycle
        .enqueue(&NewCommand::new("cmd-7", "pump_on", "operator"))
        .await
        .expect("enqueue failed");

    h.clock.advance_minutes(1);
    h.core.applier.apply().await.expect("apply failed");

    let acks = h.core.lifecycle.list_acks("cmd-7").await.expect("acks failed");
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].ack_type, AckType::Executed);
    assert_eq!(acks[0].measured_current, Some(1.4));
    assert_eq!(acks[0].measured_flow, Some(6.0));
}

#[tokio::test]
async fn test_recovered_downstream_drains_queue() {
    let h = harness_with(DeliveryConfig::default(), SwitchableDelivery::failing()).await;

    for code in ["A", "B"] {
        h.core
            .alert_queue
            .enqueue(&NewAlert::new(AlertSource::Infra, code, "bridge"))
            .await
            .expect("enqueue failed");
    }

    let report = h.core.dispatcher.dispatch().await.expect("dispatch failed");
    assert_eq!(report.failed, 2);

    h.delivery.set_failing(false);
    h.clock.advance_minutes(1);
    let report = h.core.dispatcher.dispatch().await.expect("dispatch failed");
    assert_eq!(report.succeeded, 2);
    assert_eq!(h.delivery.delivered(), vec!["A", "B"]);

    let depth = h.core.alert_queue.depth().await.expect("depth failed");
    assert_eq!((depth.live, depth.dlq), (0, 0));
}

//! Applies buffered status events once their command can take them

use super::queue::StatusUpdateQueue;
use crate::command::{CommandLifecycle, TransitionOutcome};
use crate::config::DispatchConfig;
use crate::error::Result;
use crate::store::PendingStatusUpdate;
use crate::worker::{BatchReport, FailureOutcome, PeriodicJob};
use async_trait::async_trait;
use hydrolink_shared::NodeStatus;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drains the status-update buffer through the lifecycle manager
pub struct StatusUpdateApplier {
    queue: StatusUpdateQueue,
    lifecycle: Arc<CommandLifecycle>,
    config: DispatchConfig,
}

impl StatusUpdateApplier {
    pub fn new(
        queue: StatusUpdateQueue,
        lifecycle: Arc<CommandLifecycle>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            config,
        }
    }

    /// Apply one batch of due events
    ///
    /// Applied, redelivered and stale events leave the buffer. Transient
    /// failures (command not created yet, store errors) back off and retry;
    /// an event the state machine rejects outright goes straight to the DLQ.
    pub async fn apply(&self) -> Result<BatchReport> {
        let rows = self
            .queue
            .claim_due(self.config.batch_size, self.config.claim_lease_ms())
            .await?;

        let mut report = BatchReport::default();
        for row in rows {
            report.attempted += 1;
            if let Err(e) = self.apply_row(&row, &mut report).await {
                warn!("Status update {} for {} not settled: {}", row.id, row.cmd_id, e);
                report.failed += 1;
            }
        }

        Ok(report)
    }

    async fn apply_row(&self, row: &PendingStatusUpdate, report: &mut BatchReport) -> Result<()> {
        let event = NodeStatus {
            cmd_id: row.cmd_id.clone(),
            status: row.status,
            details: row.details.0.clone(),
        };

        match self.lifecycle.apply_status_update(&event).await {
            Ok(TransitionOutcome::Superseded { current, requested }) => {
                info!(
                    "Discarded stale {} update for {} (command is {})",
                    requested, row.cmd_id, current
                );
                self.queue.remove(row).await?;
                report.skipped += 1;
            }
            Ok(outcome) => {
                debug!("Applied buffered update for {}: {:?}", row.cmd_id, outcome);
                self.queue.remove(row).await?;
                report.succeeded += 1;
            }
            Err(e) if e.is_transient() => {
                report.failed += 1;
                match self.queue.record_failure(row, &e.to_string()).await? {
                    FailureOutcome::DeadLettered { .. } => report.dead_lettered += 1,
                    FailureOutcome::Retrying { attempts, .. } => {
                        debug!(
                            "Update for {} not applied yet ({}/{}): {}",
                            row.cmd_id, attempts, row.max_attempts, e
                        );
                    }
                    FailureOutcome::Stale => {}
                }
            }
            Err(e) => {
                report.failed += 1;
                if self.queue.dead_letter(row, &e.to_string()).await? {
                    report.dead_lettered += 1;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for StatusUpdateApplier {
    fn name(&self) -> &'static str {
        "STATUS"
    }

    async fn run_once(&self) -> Result<BatchReport> {
        self.apply().await
    }
}

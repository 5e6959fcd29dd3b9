//! Timeout sweeping for in-flight commands

use super::notify::{publish_finished, CommandEvents};
use crate::config::TimeoutConfig;
use crate::error::Result;
use crate::store::commands;
use crate::store::{Command, Store};
use crate::worker::{BatchReport, PeriodicJob};
use async_trait::async_trait;
use hydrolink_shared::{delivery, Clock, COMMAND_TIMEOUT_EVENT};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Moves SENT/ACK commands that outlived the timeout into TIMEOUT
pub struct TimeoutSweeper {
    store: Store,
    clock: Arc<dyn Clock>,
    events: Arc<dyn CommandEvents>,
    config: TimeoutConfig,
}

impl TimeoutSweeper {
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        events: Arc<dyn CommandEvents>,
        config: TimeoutConfig,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            config,
        }
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// One sweep over stale in-flight commands
    ///
    /// A command answered between selection and update is skipped; a failure
    /// on one command does not stop the sweep.
    pub async fn sweep(&self) -> Result<BatchReport> {
        let now = self.clock.now_ms();
        let cutoff = now - self.config.timeout_ms();

        let stale =
            commands::find_stale_in_flight(self.store.pool(), cutoff, self.config.batch_size)
                .await?;

        let mut report = BatchReport::default();
        for command in stale {
            report.attempted += 1;
            match self.expire(&command, cutoff, now).await {
                Ok(true) => report.succeeded += 1,
                Ok(false) => {
                    debug!("Command {} resolved before timeout write", command.cmd_id);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to time out {}: {}", command.cmd_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn expire(&self, command: &Command, cutoff: i64, now: i64) -> Result<bool> {
        let message = format!(
            "No response within {} minutes",
            self.config.timeout_minutes
        );

        let mut tx = self.store.begin().await?;
        let Some(timed_out) = commands::mark_timed_out(
            &mut *tx,
            command.id,
            cutoff,
            now,
            delivery::TIMEOUT_ERROR_CODE,
            &message,
        )
        .await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        if let Some(zone_id) = command.zone_id {
            let payload = json!({
                "command_id": command.id,
                "cmd_id": command.cmd_id,
                "node_id": command.node_id,
                "channel": command.channel,
                "status_before": command.status,
                "sent_at": command.sent_at,
                "timeout_minutes": self.config.timeout_minutes,
            });
            commands::insert_zone_event(&mut *tx, zone_id, COMMAND_TIMEOUT_EVENT, &payload, now)
                .await?;
        }
        tx.commit().await?;

        info!(
            "Command {} timed out in {} after {} minutes",
            command.cmd_id, command.status, self.config.timeout_minutes
        );

        publish_finished(self.events.as_ref(), &timed_out.finished_event()).await;

        Ok(true)
    }
}

#[async_trait]
impl PeriodicJob for TimeoutSweeper {
    fn name(&self) -> &'static str {
        "SWEEPER"
    }

    async fn run_once(&self) -> Result<BatchReport> {
        self.sweep().await
    }
}

//! DLQ replay: requeue dead-lettered alerts for another round of delivery

use crate::config::ReplayConfig;
use crate::error::Result;
use crate::store::alerts;
use crate::store::{DeadLetterAlert, Store};
use crate::worker::{BatchReport, PeriodicJob};
use async_trait::async_trait;
use hydrolink_shared::{Clock, ReplayRequest};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Moves old DLQ alerts back into the live queue with a fresh retry budget
///
/// The DLQ row is kept and stamped `replayed_at`, so each dead-lettered
/// alert is replayed at most once even with concurrent replayers.
pub struct DlqReplayWorker {
    store: Store,
    clock: Arc<dyn Clock>,
    config: ReplayConfig,
    dispatcher_wake: Option<Arc<Notify>>,
}

impl DlqReplayWorker {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: ReplayConfig) -> Self {
        Self {
            store,
            clock,
            config,
            dispatcher_wake: None,
        }
    }

    /// Wake the alert dispatcher after a replay that requeued something
    pub fn with_dispatcher_wake(mut self, wake: Arc<Notify>) -> Self {
        self.dispatcher_wake = Some(wake);
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay DLQ alerts dead-lettered at least `older_than_hours` ago
    pub async fn replay(&self, request: ReplayRequest) -> Result<BatchReport> {
        let now = self.clock.now_ms();
        let moved_before = now - i64::from(request.older_than_hours) * HOUR_MS;

        let rows = alerts::list_replayable(self.store.pool(), moved_before, request.limit).await?;

        let mut report = BatchReport::default();
        for row in rows {
            report.attempted += 1;
            match self.replay_one(&row, now).await {
                Ok(Some(new_id)) => {
                    info!(
                        "Replayed DLQ alert {} ({}) as alert {}",
                        row.id, row.code, new_id
                    );
                    report.succeeded += 1;
                }
                Ok(None) => {
                    debug!("DLQ alert {} already replayed", row.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to replay DLQ alert {}: {}", row.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.succeeded > 0 {
            if let Some(wake) = &self.dispatcher_wake {
                wake.notify_one();
            }
        }

        Ok(report)
    }

    async fn replay_one(&self, row: &DeadLetterAlert, now: i64) -> Result<Option<i64>> {
        let mut tx = self.store.begin().await?;

        if !alerts::mark_replayed(&mut *tx, row.id, now).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let Some(new_id) = alerts::insert_from_dlq(&mut *tx, row.id, now).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(new_id))
    }
}

#[async_trait]
impl PeriodicJob for DlqReplayWorker {
    fn name(&self) -> &'static str {
        "REPLAY"
    }

    async fn run_once(&self) -> Result<BatchReport> {
        self.replay(ReplayRequest {
            older_than_hours: self.config.older_than_hours,
            limit: self.config.limit,
        })
        .await
    }
}

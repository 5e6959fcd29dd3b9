//! Durable buffer for node status events that could not be applied yet

use crate::error::{DeliveryError, Result};
use crate::store::status_updates;
use crate::store::{DeadLetterStatusUpdate, PendingStatusUpdate, Store};
use crate::worker::{FailureOutcome, QueueDepth};
use hydrolink_shared::{Clock, NodeStatus, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of buffering a status event
#[derive(Debug, Clone)]
pub enum Buffered {
    Queued(PendingStatusUpdate),
    /// The same `(cmd_id, status)` is already waiting
    Duplicate,
}

/// Status events awaiting application, plus their dead-letter table
#[derive(Clone)]
pub struct StatusUpdateQueue {
    store: Store,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl StatusUpdateQueue {
    pub fn new(store: Store, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Buffer an event; a second copy of the same `(cmd_id, status)` is dropped
    pub async fn enqueue(&self, event: &NodeStatus) -> Result<Buffered> {
        if event.cmd_id.trim().is_empty() {
            return Err(DeliveryError::Validation("cmd_id must not be empty".into()));
        }

        let now = self.clock.now_ms();
        let row = status_updates::insert(
            self.store.pool(),
            &event.cmd_id,
            event.status,
            &event.details,
            self.policy.max_attempts,
            now,
        )
        .await?;

        match row {
            Some(row) => {
                info!("Buffered {} update for {} (id={})", row.status, row.cmd_id, row.id);
                Ok(Buffered::Queued(row))
            }
            None => {
                debug!("{} update for {} already buffered", event.status, event.cmd_id);
                Ok(Buffered::Duplicate)
            }
        }
    }

    /// Buffered events for one command, oldest first
    pub async fn pending_for(&self, cmd_id: &str) -> Result<Vec<PendingStatusUpdate>> {
        status_updates::list_for_command(self.store.pool(), cmd_id).await
    }

    /// Claim up to `limit` due events; each stays hidden for `lease_ms`
    pub async fn claim_due(&self, limit: u32, lease_ms: i64) -> Result<Vec<PendingStatusUpdate>> {
        let now = self.clock.now_ms();
        let due = status_updates::list_due(self.store.pool(), now, limit).await?;

        let mut claimed = Vec::with_capacity(due.len());
        for row in due {
            if status_updates::claim(self.store.pool(), row.id, now, now + lease_ms).await? {
                claimed.push(row);
            }
        }
        Ok(claimed)
    }

    /// Applied (or obsolete): the row leaves the buffer
    pub async fn remove(&self, row: &PendingStatusUpdate) -> Result<()> {
        status_updates::delete(self.store.pool(), row.id).await?;
        Ok(())
    }

    /// Count a failed apply; schedules a retry or dead-letters the row
    pub async fn record_failure(
        &self,
        row: &PendingStatusUpdate,
        error: &str,
    ) -> Result<FailureOutcome> {
        let now = self.clock.now_ms();
        let attempts = row.retry_count + 1;
        let next_retry_at = self
            .policy
            .next_retry_at(now, u32::try_from(attempts).unwrap_or(u32::MAX));

        let mut tx = self.store.begin().await?;
        let recorded = status_updates::record_failure(
            &mut *tx,
            row.id,
            row.retry_count,
            error,
            now,
            next_retry_at,
        )
        .await?;
        if !recorded {
            tx.rollback().await?;
            return Ok(FailureOutcome::Stale);
        }

        if attempts >= row.max_attempts {
            if !status_updates::move_to_dlq(&mut *tx, row.id, now).await? {
                tx.rollback().await?;
                return Ok(FailureOutcome::Stale);
            }
            tx.commit().await?;
            warn!(
                "{} update for {} dead-lettered after {} attempts: {}",
                row.status, row.cmd_id, attempts, error
            );
            return Ok(FailureOutcome::DeadLettered { attempts });
        }

        tx.commit().await?;
        debug!(
            "{} update for {} failed ({}/{}), retry at {}",
            row.status, row.cmd_id, attempts, row.max_attempts, next_retry_at
        );
        Ok(FailureOutcome::Retrying {
            attempts,
            next_retry_at,
        })
    }

    /// Move a row that can never apply straight to the DLQ
    pub async fn dead_letter(&self, row: &PendingStatusUpdate, error: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut tx = self.store.begin().await?;

        // Stamp the reason first so it travels with the row
        let recorded = status_updates::record_failure(
            &mut *tx,
            row.id,
            row.retry_count,
            error,
            now,
            now,
        )
        .await?;
        if !recorded || !status_updates::move_to_dlq(&mut *tx, row.id, now).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        warn!(
            "{} update for {} dead-lettered: {}",
            row.status, row.cmd_id, error
        );
        Ok(true)
    }

    pub async fn list_dlq(&self, limit: u32) -> Result<Vec<DeadLetterStatusUpdate>> {
        status_updates::list_dlq(self.store.pool(), limit).await
    }

    pub async fn depth(&self) -> Result<QueueDepth> {
        Ok(QueueDepth {
            live: status_updates::count_live(self.store.pool()).await?,
            dlq: status_updates::count_dlq(self.store.pool()).await?,
        })
    }
}

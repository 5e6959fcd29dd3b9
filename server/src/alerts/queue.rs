//! Durable alert queue with retry bookkeeping

use crate::error::{DeliveryError, Result};
use crate::store::alerts;
use crate::store::{DeadLetterAlert, PendingAlert, Store};
use crate::worker::{FailureOutcome, QueueDepth};
use hydrolink_shared::{AlertSource, Clock, NewAlert, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Alerts awaiting delivery, plus their dead-letter table
#[derive(Clone)]
pub struct AlertQueue {
    store: Store,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl AlertQueue {
    pub fn new(store: Store, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Persist an alert in `pending` with zero attempts
    pub async fn enqueue(&self, alert: &NewAlert) -> Result<PendingAlert> {
        if alert.code.trim().is_empty() {
            return Err(DeliveryError::Validation("alert code must not be empty".into()));
        }
        if alert.alert_type.trim().is_empty() {
            return Err(DeliveryError::Validation("alert type must not be empty".into()));
        }

        let now = self.clock.now_ms();
        let row = alerts::insert(self.store.pool(), alert, self.policy.max_attempts, now).await?;
        info!(
            "Alert {} queued: {} {} (source={} zone={:?})",
            row.id, row.code, row.alert_type, row.source, row.zone_id
        );
        Ok(row)
    }

    /// Enqueue from loosely typed fields; an unknown source is rejected
    pub async fn enqueue_raw(
        &self,
        zone_id: Option<i64>,
        source: &str,
        code: &str,
        alert_type: &str,
        details: Value,
    ) -> Result<PendingAlert> {
        let source: AlertSource = source.parse()?;
        let mut alert = NewAlert::new(source, code, alert_type).with_details(details);
        alert.zone_id = zone_id;
        self.enqueue(&alert).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<PendingAlert>> {
        alerts::find(self.store.pool(), id).await
    }

    /// Claim up to `limit` due alerts for delivery
    ///
    /// Failed rows whose backoff has elapsed are returned to `pending` first.
    /// Each claimed row stays invisible to other dispatchers for `lease_ms`.
    pub async fn claim_due(&self, limit: u32, lease_ms: i64) -> Result<Vec<PendingAlert>> {
        let now = self.clock.now_ms();

        let promoted = alerts::promote_due(self.store.pool(), now).await?;
        if promoted > 0 {
            debug!("{} failed alerts due for retry", promoted);
        }

        let due = alerts::list_due(self.store.pool(), now, limit).await?;
        let mut claimed = Vec::with_capacity(due.len());
        for alert in due {
            if alerts::claim(self.store.pool(), alert.id, now, now + lease_ms).await? {
                claimed.push(alert);
            } else {
                debug!("Alert {} claimed by another dispatcher", alert.id);
            }
        }

        Ok(claimed)
    }

    /// Delivered: the row leaves the queue
    pub async fn record_success(&self, alert: &PendingAlert) -> Result<()> {
        if !alerts::delete(self.store.pool(), alert.id).await? {
            debug!("Alert {} already gone after delivery", alert.id);
        }
        Ok(())
    }

    /// Count a failed delivery; schedules a retry or dead-letters the row
    pub async fn record_failure(&self, alert: &PendingAlert, error: &str) -> Result<FailureOutcome> {
        let now = self.clock.now_ms();
        let attempts = alert.attempts + 1;
        let exhausted = attempts >= alert.max_attempts;
        let next_retry_at = self
            .policy
            .next_retry_at(now, u32::try_from(attempts).unwrap_or(u32::MAX));

        let mut tx = self.store.begin().await?;
        let recorded =
            alerts::record_failure(&mut *tx, alert.id, alert.attempts, error, now, next_retry_at)
                .await?;
        if !recorded {
            tx.rollback().await?;
            debug!("Alert {} changed before failure was recorded", alert.id);
            return Ok(FailureOutcome::Stale);
        }

        if exhausted {
            if !alerts::move_to_dlq(&mut *tx, alert.id, now).await? {
                tx.rollback().await?;
                return Ok(FailureOutcome::Stale);
            }
            tx.commit().await?;
            warn!(
                "Alert {} ({}) dead-lettered after {} attempts: {}",
                alert.id, alert.code, attempts, error
            );
            return Ok(FailureOutcome::DeadLettered { attempts });
        }

        tx.commit().await?;
        debug!(
            "Alert {} failed ({}/{}), retry at {}",
            alert.id, attempts, alert.max_attempts, next_retry_at
        );
        Ok(FailureOutcome::Retrying {
            attempts,
            next_retry_at,
        })
    }

    /// Most recently dead-lettered alerts first
    pub async fn list_dlq(&self, limit: u32) -> Result<Vec<DeadLetterAlert>> {
        alerts::list_dlq(self.store.pool(), limit).await
    }

    pub async fn depth(&self) -> Result<QueueDepth> {
        Ok(QueueDepth {
            live: alerts::count_live(self.store.pool()).await?,
            dlq: alerts::count_dlq(self.store.pool()).await?,
        })
    }
}

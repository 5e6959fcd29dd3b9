//! Alert dispatcher: drains the alert queue into the downstream sink

use super::queue::AlertQueue;
use crate::config::DispatchConfig;
use crate::error::Result;
use crate::store::PendingAlert;
use crate::worker::{BatchReport, FailureOutcome, PeriodicJob};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Downstream alert sink (notification service, webhook, ...)
#[async_trait]
pub trait AlertDelivery: Send + Sync {
    async fn deliver(&self, alert: &PendingAlert) -> anyhow::Result<()>;
}

/// Sink that only logs; used when no downstream is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl AlertDelivery for LogDelivery {
    async fn deliver(&self, alert: &PendingAlert) -> anyhow::Result<()> {
        info!(
            "ALERT {} [{}] {} zone={:?} details={}",
            alert.code, alert.source, alert.alert_type, alert.zone_id, alert.details.0
        );
        Ok(())
    }
}

/// Delivers due alerts in batches, recording each outcome in the queue
pub struct AlertDispatcher {
    queue: AlertQueue,
    delivery: Arc<dyn AlertDelivery>,
    config: DispatchConfig,
    wake: Arc<Notify>,
}

impl AlertDispatcher {
    pub fn new(queue: AlertQueue, delivery: Arc<dyn AlertDelivery>, config: DispatchConfig) -> Self {
        Self {
            queue,
            delivery,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an immediate dispatch run
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Deliver one batch of due alerts
    ///
    /// Each alert is handled on its own; a store error on one row is logged
    /// and the batch continues.
    pub async fn dispatch(&self) -> Result<BatchReport> {
        let claimed = self
            .queue
            .claim_due(self.config.batch_size, self.config.claim_lease_ms())
            .await?;

        let mut report = BatchReport::default();
        for alert in claimed {
            report.attempted += 1;

            // No store transaction is open across the outbound call
            match self.delivery.deliver(&alert).await {
                Ok(()) => {
                    if let Err(e) = self.queue.record_success(&alert).await {
                        warn!("Alert {} delivered but not removed: {}", alert.id, e);
                    }
                    report.succeeded += 1;
                }
                Err(delivery_err) => {
                    report.failed += 1;
                    let error = format!("{:#}", delivery_err);
                    match self.queue.record_failure(&alert, &error).await {
                        Ok(FailureOutcome::DeadLettered { .. }) => report.dead_lettered += 1,
                        Ok(FailureOutcome::Retrying { attempts, .. }) => {
                            warn!(
                                "Alert {} delivery failed ({}/{}): {}",
                                alert.id, attempts, alert.max_attempts, error
                            );
                        }
                        Ok(FailureOutcome::Stale) => report.skipped += 1,
                        Err(e) => warn!("Failed to record failure of alert {}: {}", alert.id, e),
                    }
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl PeriodicJob for AlertDispatcher {
    fn name(&self) -> &'static str {
        "ALERTS"
    }

    async fn run_once(&self) -> Result<BatchReport> {
        self.dispatch().await
    }
}

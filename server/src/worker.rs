//! Periodic worker plumbing shared by the sweeper, dispatchers and replay
//!
//! Each worker is an independent tokio task with no in-memory state shared
//! with the others; all coordination goes through the store.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Per-item outcome counts for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Items left alone because another writer got there first
    pub skipped: u32,
    pub dead_lettered: u32,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} succeeded={} failed={} skipped={} dead_lettered={}",
            self.attempted, self.succeeded, self.failed, self.skipped, self.dead_lettered
        )
    }
}

/// What happened to a queue row after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Backoff scheduled
    Retrying { attempts: i64, next_retry_at: i64 },
    /// Attempts exhausted, row moved to the DLQ
    DeadLettered { attempts: i64 },
    /// Row changed under us (another worker recorded the attempt)
    Stale,
}

/// Row counts for a live table and its DLQ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub live: i64,
    pub dlq: i64,
}

/// A job a worker runs on every tick
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<BatchReport>;
}

/// Run `job` every `period` until `shutdown` flips to true
///
/// `wake` lets another component trigger an immediate run (DLQ replay wakes
/// the alert dispatcher this way).
pub async fn run_periodic(
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    wake: Option<Arc<Notify>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[{}] Worker started (every {:?})", job.name(), period);

    loop {
        let woken = async {
            match &wake {
                Some(notify) => notify.notified().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ticker.tick() => {}
            _ = woken => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match job.run_once().await {
            Ok(report) if !report.is_empty() => {
                info!("[{}] {}", job.name(), report);
            }
            Ok(_) => {}
            Err(e) => {
                error!("[{}] Run failed: {}", job.name(), e);
            }
        }
    }

    info!("[{}] Worker stopped", job.name());
}

/// Tell every worker watching `shutdown` to stop
///
/// Returns false when no worker was left listening.
pub fn signal_shutdown(shutdown: &watch::Sender<bool>) -> bool {
    if shutdown.send(true).is_err() {
        debug!("No worker left listening for shutdown");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: AtomicU32,
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> Result<BatchReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(BatchReport::default())
        }
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let job = Arc::new(CountingJob {
            runs: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_periodic(
            job.clone(),
            Duration::from_millis(10),
            None,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).expect("send failed");
        handle.await.expect("worker panicked");

        assert!(job.runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_wake_triggers_run() {
        let job = Arc::new(CountingJob {
            runs: AtomicU32::new(0),
        });
        let wake = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_periodic(
            job.clone(),
            Duration::from_secs(3600),
            Some(wake.clone()),
            rx,
        ));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = job.runs.load(Ordering::SeqCst);

        wake.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), before + 1);

        tx.send(true).expect("send failed");
        handle.await.expect("worker panicked");
    }

    #[tokio::test]
    async fn test_signal_shutdown() {
        let (tx, rx) = watch::channel(false);
        assert!(signal_shutdown(&tx));
        assert!(*rx.borrow());

        drop(rx);
        assert!(!signal_shutdown(&tx));
    }

    #[test]
    fn test_report_display() {
        let report = BatchReport {
            attempted: 3,
            succeeded: 1,
            failed: 2,
            skipped: 0,
            dead_lettered: 1,
        };
        assert_eq!(
            report.to_string(),
            "attempted=3 succeeded=1 failed=2 skipped=0 dead_lettered=1"
        );
        assert!(BatchReport::default().is_empty());
    }
}

//! Wiring for the delivery core: one store, one clock, every component

use crate::alerts::{AlertDelivery, AlertDispatcher, AlertQueue, DlqReplayWorker};
use crate::command::{CommandEvents, CommandLifecycle, TimeoutSweeper};
use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::ingest::Ingest;
use crate::status_updates::{StatusUpdateApplier, StatusUpdateQueue};
use crate::store::Store;
use crate::worker::{run_periodic, PeriodicJob};
use hydrolink_shared::Clock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// All delivery components sharing one store
pub struct DeliveryCore {
    pub store: Store,
    pub config: DeliveryConfig,
    pub lifecycle: Arc<CommandLifecycle>,
    pub sweeper: Arc<TimeoutSweeper>,
    pub alert_queue: AlertQueue,
    pub dispatcher: Arc<AlertDispatcher>,
    pub replay: Arc<DlqReplayWorker>,
    pub status_queue: StatusUpdateQueue,
    pub applier: Arc<StatusUpdateApplier>,
    pub ingest: Arc<Ingest>,
}

impl DeliveryCore {
    pub fn new(
        store: Store,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn CommandEvents>,
        delivery: Arc<dyn AlertDelivery>,
    ) -> Self {
        let lifecycle = Arc::new(CommandLifecycle::new(
            store.clone(),
            clock.clone(),
            events.clone(),
        ));
        let sweeper = Arc::new(TimeoutSweeper::new(
            store.clone(),
            clock.clone(),
            events,
            config.timeout.clone(),
        ));

        let alert_queue = AlertQueue::new(store.clone(), clock.clone(), config.alert_retry);
        let dispatcher = Arc::new(AlertDispatcher::new(
            alert_queue.clone(),
            delivery,
            config.alert_dispatch.clone(),
        ));
        let replay = Arc::new(
            DlqReplayWorker::new(store.clone(), clock.clone(), config.replay.clone())
                .with_dispatcher_wake(dispatcher.waker()),
        );

        let status_queue = StatusUpdateQueue::new(store.clone(), clock, config.status_retry);
        let applier = Arc::new(StatusUpdateApplier::new(
            status_queue.clone(),
            lifecycle.clone(),
            config.status_apply.clone(),
        ));
        let ingest = Arc::new(Ingest::new(lifecycle.clone(), status_queue.clone()));

        Self {
            store,
            config,
            lifecycle,
            sweeper,
            alert_queue,
            dispatcher,
            replay,
            status_queue,
            applier,
            ingest,
        }
    }

    /// Open the configured database and wire everything on top of it
    pub async fn open(
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn CommandEvents>,
        delivery: Arc<dyn AlertDelivery>,
    ) -> Result<Self> {
        let store = Store::open(&config.database_url).await?;
        Ok(Self::new(store, config, clock, events, delivery))
    }

    /// Spawn the sweeper, dispatcher, applier and (if enabled) replay workers
    pub fn spawn_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let sweeper: Arc<dyn PeriodicJob> = self.sweeper.clone();
        handles.push(tokio::spawn(run_periodic(
            sweeper,
            self.config.timeout.sweep_interval,
            None,
            shutdown.clone(),
        )));

        let dispatcher: Arc<dyn PeriodicJob> = self.dispatcher.clone();
        handles.push(tokio::spawn(run_periodic(
            dispatcher,
            self.config.alert_dispatch.interval,
            Some(self.dispatcher.waker()),
            shutdown.clone(),
        )));

        let applier: Arc<dyn PeriodicJob> = self.applier.clone();
        handles.push(tokio::spawn(run_periodic(
            applier,
            self.config.status_apply.interval,
            None,
            shutdown.clone(),
        )));

        if self.config.replay.enabled {
            let replay: Arc<dyn PeriodicJob> = self.replay.clone();
            handles.push(tokio::spawn(run_periodic(
                replay,
                self.config.replay.interval,
                None,
                shutdown,
            )));
        } else {
            info!("Scheduled DLQ replay disabled");
        }

        handles
    }
}

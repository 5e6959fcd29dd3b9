//! Test harness: a full delivery core over an in-memory store and a manual clock

#![allow(dead_code)]

use async_trait::async_trait;
use hydrolink_server::store::PendingAlert;
use hydrolink_server::{AlertDelivery, ChannelEvents, DeliveryConfig, DeliveryCore, Store};
use hydrolink_shared::{CommandFinished, ManualClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// Start of every test clock (2026-01-01T00:00:00Z)
pub const T0: i64 = 1_767_225_600_000;

/// Downstream that fails while `failing` is set and records deliveries
#[derive(Default)]
pub struct SwitchableDelivery {
    failing: AtomicBool,
    delivered: Mutex<Vec<String>>,
}

impl SwitchableDelivery {
    pub fn failing() -> Self {
        let delivery = Self::default();
        delivery.set_failing(true);
        delivery
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl AlertDelivery for SwitchableDelivery {
    async fn deliver(&self, alert: &PendingAlert) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("downstream unavailable");
        }
        self.delivered
            .lock()
            .expect("lock poisoned")
            .push(alert.code.clone());
        Ok(())
    }
}

pub struct Harness {
    pub core: DeliveryCore,
    pub clock: Arc<ManualClock>,
    pub delivery: Arc<SwitchableDelivery>,
    pub finished: UnboundedReceiver<CommandFinished>,
}

impl Harness {
    /// Drain every notification published so far
    pub fn take_finished(&mut self) -> Vec<CommandFinished> {
        let mut events = Vec::new();
        while let Ok(event) = self.finished.try_recv() {
            events.push(event);
        }
        events
    }
}

pub async fn harness() -> Harness {
    harness_with(DeliveryConfig::default(), SwitchableDelivery::default()).await
}

pub async fn harness_with(config: DeliveryConfig, delivery: SwitchableDelivery) -> Harness {
    let store = Store::open_in_memory().await.expect("open failed");
    harness_on(store, config, delivery, T0)
}

pub fn harness_on(
    store: Store,
    config: DeliveryConfig,
    delivery: SwitchableDelivery,
    now_ms: i64,
) -> Harness {
    let clock = Arc::new(ManualClock::new(now_ms));
    let (events, finished) = ChannelEvents::new();
    let delivery = Arc::new(delivery);

    let core = DeliveryCore::new(
        store,
        config,
        clock.clone(),
        Arc::new(events),
        delivery.clone(),
    );

    Harness {
        core,
        clock,
        delivery,
        finished,
    }
}

//! "command finished" notification sink

use async_trait::async_trait;
use hydrolink_shared::CommandFinished;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Receives terminal command notifications (UI/event layer)
#[async_trait]
pub trait CommandEvents: Send + Sync {
    async fn command_finished(&self, event: &CommandFinished) -> anyhow::Result<()>;
}

/// Logs notifications; used when no event bus is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

#[async_trait]
impl CommandEvents for LogEvents {
    async fn command_finished(&self, event: &CommandFinished) -> anyhow::Result<()> {
        info!(
            "Command {} finished: {} (result_code={} duration_ms={:?})",
            event.cmd_id, event.status, event.result_code, event.duration_ms
        );
        Ok(())
    }
}

/// Forwards notifications onto an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<CommandFinished>,
}

impl ChannelEvents {
    /// Create the sink and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommandFinished>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandEvents for ChannelEvents {
    async fn command_finished(&self, event: &CommandFinished) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("Event channel closed"))
    }
}

/// Deliver a notification after the store write; failures are logged only
pub(crate) async fn publish_finished(events: &dyn CommandEvents, event: &CommandFinished) {
    if let Err(e) = events.command_finished(event).await {
        warn!("Failed to publish finish of {}: {}", event.cmd_id, e);
    }
}

use clap::Parser;
use futures::future::join_all;
use hydrolink_server::worker::signal_shutdown;
use hydrolink_server::{ChannelEvents, DeliveryArgs, DeliveryCore, LogDelivery};
use hydrolink_shared::{codec, SystemClock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Delivery daemon: timeout sweeper, alert dispatcher, status-update applier
/// and scheduled DLQ replay
#[derive(Parser, Debug)]
#[command(name = "hydrolink-server", version)]
struct Cli {
    #[command(flatten)]
    delivery: DeliveryArgs,

    /// Write "command finished" notifications to stdout as JSON lines
    #[arg(long, env = "HYDROLINK_EMIT_FINISHED")]
    emit_finished: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.delivery.into_config();

    info!("Hydrolink delivery core starting");
    info!("  Database: {}", config.database_url);
    info!("  Command timeout: {} min", config.timeout.timeout_minutes);
    info!(
        "  Alert retries: {} (base {} ms)",
        config.alert_retry.max_attempts, config.alert_retry.base_delay_ms
    );
    info!(
        "  Status retries: {} (base {} ms)",
        config.status_retry.max_attempts, config.status_retry.base_delay_ms
    );

    let (events, mut finished_rx) = ChannelEvents::new();
    let core = DeliveryCore::open(
        config,
        Arc::new(SystemClock),
        Arc::new(events),
        Arc::new(LogDelivery),
    )
    .await?;

    // Forward finish notifications to the event layer
    let emit = cli.emit_finished;
    let forwarder = tokio::spawn(async move {
        while let Some(event) = finished_rx.recv().await {
            info!(
                "Command {} finished: {} (result_code={})",
                event.cmd_id, event.status, event.result_code
            );
            if !emit {
                continue;
            }
            match codec::encode_finished(&event) {
                Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                Err(e) => warn!("Failed to encode finish of {}: {}", event.cmd_id, e),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = core.spawn_workers(shutdown_rx);
    info!("{} workers running", workers.len());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, stopping workers");
    signal_shutdown(&shutdown_tx);

    for result in join_all(workers).await {
        if let Err(e) = result {
            error!("Worker task failed: {}", e);
        }
    }

    core.store.close().await;
    drop(core);
    if let Err(e) = forwarder.await {
        error!("Notification forwarder failed: {}", e);
    }

    info!("Hydrolink delivery core stopped");
    Ok(())
}

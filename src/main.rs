mod handlers;

use clap::{Parser, Subcommand, ValueEnum};
use hydrolink_server::{DeliveryArgs, DeliveryCore, LogDelivery, LogEvents};
use hydrolink_shared::{delivery, CommandStatus, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Inspect and operate the Hydrolink delivery core
#[derive(Parser, Debug)]
#[command(name = "hydrolink-ctl", version)]
struct Cli {
    #[command(flatten)]
    delivery: DeliveryArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a command and its current status
    Status { cmd_id: String },

    /// Show the ack log of a command
    Acks { cmd_id: String },

    /// Show the zone timeline
    Events { zone_id: i64 },

    /// Show live and DLQ row counts for both queues
    Depth,

    /// List dead-lettered rows, newest first
    Dlq {
        #[arg(value_enum)]
        queue: QueueKind,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Run one timeout sweep
    Sweep,

    /// Run one alert dispatch batch (to the log sink)
    Dispatch,

    /// Run one status-update apply batch
    Apply,

    /// Requeue DLQ alerts for another round of delivery
    Replay {
        /// Only rows dead-lettered at least this many hours ago
        #[arg(long, default_value_t = delivery::REPLAY_OLDER_THAN_HOURS)]
        older_than_hours: u32,

        /// Maximum rows to replay
        #[arg(long, default_value_t = delivery::REPLAY_LIMIT)]
        limit: u32,
    },

    /// Force a command into a status
    Override {
        cmd_id: String,
        status: CommandStatus,
        #[arg(long)]
        reason: String,
    },

    /// Feed a JSON event, as the bridge or a detector would
    Ingest {
        #[arg(value_enum)]
        kind: EventKind,

        /// Inline JSON payload; read from --file when omitted
        payload: Option<String>,

        #[arg(long, conflicts_with = "payload")]
        file: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueueKind {
    Alerts,
    StatusUpdates,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EventKind {
    Command,
    Ack,
    Status,
    Alert,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.delivery.into_config();
    debug!("Opening {}", config.database_url);

    let core = DeliveryCore::open(
        config,
        Arc::new(SystemClock),
        Arc::new(LogEvents),
        Arc::new(LogDelivery),
    )
    .await?;

    let output = match cli.command {
        Command::Status { cmd_id } => handlers::show_command(&core, &cmd_id).await,
        Command::Acks { cmd_id } => handlers::show_acks(&core, &cmd_id).await,
        Command::Events { zone_id } => handlers::show_zone_events(&core, zone_id).await,
        Command::Depth => handlers::show_depth(&core).await,
        Command::Dlq { queue, limit } => match queue {
            QueueKind::Alerts => handlers::show_alert_dlq(&core, limit).await,
            QueueKind::StatusUpdates => handlers::show_status_dlq(&core, limit).await,
        },
        Command::Sweep => handlers::sweep(&core).await,
        Command::Dispatch => handlers::dispatch(&core).await,
        Command::Apply => handlers::apply(&core).await,
        Command::Replay {
            older_than_hours,
            limit,
        } => handlers::replay(&core, older_than_hours, limit).await,
        Command::Override {
            cmd_id,
            status,
            reason,
        } => handlers::override_status(&core, &cmd_id, status, &reason).await,
        Command::Ingest {
            kind,
            payload,
            file,
        } => {
            let bytes = match (payload, file) {
                (Some(inline), _) => inline.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path).await?,
                (None, None) => anyhow::bail!("Provide a payload or --file"),
            };
            match kind {
                EventKind::Command => handlers::ingest_command(&core, &bytes).await,
                EventKind::Ack => handlers::ingest_ack(&core, &bytes).await,
                EventKind::Status => handlers::ingest_status(&core, &bytes).await,
                EventKind::Alert => handlers::ingest_alert(&core, &bytes).await,
            }
        }
    };

    core.store.close().await;

    let value = output?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

//! Hydrolink delivery core
//!
//! Reliable command delivery and reconciliation between the backend, the
//! MQTT bridge and field nodes:
//! - command lifecycle with two-phase acks and timeouts
//! - alert delivery with retry, dead-lettering and replay
//! - buffering of node status events that arrive before their command
//!
//! Every component coordinates only through the SQLite store.

pub mod alerts;
pub mod command;
pub mod config;
pub mod error;
pub mod ingest;
mod runtime;
pub mod status_updates;
pub mod store;
pub mod worker;

pub use runtime::DeliveryCore;
pub use alerts::{AlertDelivery, AlertDispatcher, AlertQueue, DlqReplayWorker, LogDelivery};
pub use command::{
    ChannelEvents, CommandEvents, CommandLifecycle, Enqueued, LogEvents, TimeoutSweeper,
    TransitionOutcome,
};
pub use config::{DeliveryArgs, DeliveryConfig};
pub use error::{DeliveryError, Result};
pub use ingest::{Ingest, IngestOutcome};
pub use status_updates::{Buffered, StatusUpdateApplier, StatusUpdateQueue};
pub use store::Store;
pub use worker::{BatchReport, FailureOutcome, QueueDepth};

//! Subcommand handlers for the operator CLI
//!
//! Each handler runs against a wired [`DeliveryCore`] and returns a JSON
//! document for printing.

mod ingest;
mod inspect;
mod maintenance;

pub use ingest::{ingest_ack, ingest_alert, ingest_command, ingest_status};
pub use inspect::{
    show_acks, show_alert_dlq, show_command, show_depth, show_status_dlq, show_zone_events,
};
pub use maintenance::{apply, dispatch, override_status, replay, sweep};

use hydrolink_server::TransitionOutcome;
use serde_json::{json, Value};

fn transition_json(outcome: &TransitionOutcome) -> Value {
    match outcome {
        TransitionOutcome::Applied { from, to } => {
            json!({"result": "applied", "from": from, "status": to})
        }
        TransitionOutcome::Unchanged { status } => json!({"result": "unchanged", "status": status}),
        TransitionOutcome::Superseded { current, requested } => {
            json!({"result": "superseded", "status": current, "requested": requested})
        }
    }
}

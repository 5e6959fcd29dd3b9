//! Command lifecycle and timeout handling for the delivery core
//!
//! This module handles:
//! - Creating commands idempotently by `cmd_id`
//! - Forward-only status transitions from bridge and node events
//! - Two-phase ack logging
//! - Timing out commands that never got a final answer
//! - Publishing exactly one "command finished" notification per command

mod lifecycle;
mod notify;
mod timeout;

pub use lifecycle::{CommandLifecycle, Enqueued, TransitionOutcome};
pub use notify::{ChannelEvents, CommandEvents, LogEvents};
pub use timeout::TimeoutSweeper;

//! Reconciliation queue for node status events
//!
//! Events that arrive before their command exists (or hit a transient store
//! error) are buffered here and applied later in creation order.

mod applier;
mod queue;

pub use applier::StatusUpdateApplier;
pub use queue::{Buffered, StatusUpdateQueue};

//! Alert delivery with retry, dead-lettering and replay

mod dispatcher;
mod queue;
mod replay;

pub use dispatcher::{AlertDelivery, AlertDispatcher, LogDelivery};
pub use queue::AlertQueue;
pub use replay::DlqReplayWorker;

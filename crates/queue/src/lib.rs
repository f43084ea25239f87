//! Multi-tier durable queue for the Beacon engine.

pub mod queue;
pub mod worker;

pub use queue::{DurableQueue, EnqueueOptions, MessageHandler, QueueDepths};

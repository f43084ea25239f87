//! Per-event processor plugins.
//!
//! Processors are a capability interface dispatched by predicate: the
//! pipeline holds an ordered collection and, for every persisted event,
//! invokes each processor whose `should_process` matches. Failures are
//! isolated per event and never abort the batch or other processors.

use async_trait::async_trait;

use beacon_core::{EnrichedEvent, Result};

pub mod error;
pub mod performance;

pub use error::ErrorProcessor;
pub use performance::PerformanceProcessor;

/// A per-event extension point.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this processor wants the event.
    fn should_process(&self, event: &EnrichedEvent) -> bool;

    /// Performs the processor's own aggregation/storage side effects.
    async fn process(&self, event: &EnrichedEvent) -> Result<()>;
}

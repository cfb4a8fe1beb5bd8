// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// The union of all sink traits, implemented by the real backend.
pub trait MetricsSink:
    DispatchMetricsSink + StoreMetricsSink + ReplicationMetricsSink + PublishMetricsSink
{
}

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured dispatch metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn dispatch_metrics() -> &'static dyn DispatchMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured store metrics sink.
pub fn store_metrics() -> &'static dyn StoreMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured replication metrics sink.
pub fn replication_metrics() -> &'static dyn ReplicationMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured publish metrics sink.
pub fn publish_metrics() -> &'static dyn PublishMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to capability dispatch.
pub trait DispatchMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for dispatched invocations, labeled by ability
    /// and outcome ("ok" | error code).
    fn inc_dispatch(&self, ability: &str, outcome: &str);
    /// Observes the latency of one dispatch, labeled by ability.
    fn observe_dispatch_seconds(&self, ability: &str, seconds: f64);
}
impl DispatchMetricsSink for NopSink {
    fn inc_dispatch(&self, _ability: &str, _outcome: &str) {}
    fn observe_dispatch_seconds(&self, _ability: &str, _seconds: f64) {}
}

/// A sink for metrics related to the allocation, blob, and claim stores.
pub trait StoreMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of blob bytes written.
    fn inc_blob_bytes_written(&self, bytes: u64);
    /// Increments the counter of allocations created.
    fn inc_allocations_created(&self);
    /// Increments the counter of commitments persisted.
    fn inc_commitments_persisted(&self);
}
impl StoreMetricsSink for NopSink {
    fn inc_blob_bytes_written(&self, _bytes: u64) {}
    fn inc_allocations_created(&self) {}
    fn inc_commitments_persisted(&self) {}
}

/// A sink for metrics related to the replication engine.
pub trait ReplicationMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of transfer attempts, labeled by outcome
    /// ("ok" | "retry" | "dead").
    fn inc_transfer_attempt(&self, outcome: &str);
    /// Sets the gauge for the current queue depth.
    fn set_queue_depth(&self, depth: u64);
    /// Observes the duration of one transfer attempt.
    fn observe_transfer_seconds(&self, seconds: f64);
}
impl ReplicationMetricsSink for NopSink {
    fn inc_transfer_attempt(&self, _outcome: &str) {}
    fn set_queue_depth(&self, _depth: u64) {}
    fn observe_transfer_seconds(&self, _seconds: f64) {}
}

/// A sink for metrics related to the publisher.
pub trait PublishMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of chain appends.
    fn inc_adverts_published(&self);
    /// Increments the counter of announce attempts, labeled by outcome.
    fn inc_announce(&self, outcome: &str);
}
impl PublishMetricsSink for NopSink {
    fn inc_adverts_published(&self) {}
    fn inc_announce(&self, _outcome: &str) {}
}

impl MetricsSink for NopSink {}

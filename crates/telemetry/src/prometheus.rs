// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.
#![allow(clippy::expect_used)]

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// We use OnceCell to hold the metric collectors. They will be initialized
// exactly once by the `install` function.

static DISPATCHES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static DISPATCH_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static BLOB_BYTES_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ALLOCATIONS_CREATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static COMMITMENTS_PERSISTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TRANSFER_ATTEMPTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static TRANSFER_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static REPLICATION_QUEUE_DEPTH: OnceCell<Gauge> = OnceCell::new();
static ADVERTS_PUBLISHED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ANNOUNCES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// The Prometheus-backed sink.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

impl DispatchMetricsSink for PrometheusSink {
    fn inc_dispatch(&self, ability: &str, outcome: &str) {
        get_metric!(DISPATCHES_TOTAL)
            .with_label_values(&[ability, outcome])
            .inc();
    }
    fn observe_dispatch_seconds(&self, ability: &str, seconds: f64) {
        get_metric!(DISPATCH_DURATION_SECONDS)
            .with_label_values(&[ability])
            .observe(seconds);
    }
}

impl StoreMetricsSink for PrometheusSink {
    fn inc_blob_bytes_written(&self, bytes: u64) {
        get_metric!(BLOB_BYTES_WRITTEN_TOTAL).inc_by(bytes);
    }
    fn inc_allocations_created(&self) {
        get_metric!(ALLOCATIONS_CREATED_TOTAL).inc();
    }
    fn inc_commitments_persisted(&self) {
        get_metric!(COMMITMENTS_PERSISTED_TOTAL).inc();
    }
}

impl ReplicationMetricsSink for PrometheusSink {
    fn inc_transfer_attempt(&self, outcome: &str) {
        get_metric!(TRANSFER_ATTEMPTS_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
    fn set_queue_depth(&self, depth: u64) {
        get_metric!(REPLICATION_QUEUE_DEPTH).set(depth as f64);
    }
    fn observe_transfer_seconds(&self, seconds: f64) {
        get_metric!(TRANSFER_DURATION_SECONDS)
            .with_label_values(&["transfer"])
            .observe(seconds);
    }
}

impl PublishMetricsSink for PrometheusSink {
    fn inc_adverts_published(&self) {
        get_metric!(ADVERTS_PUBLISHED_TOTAL).inc();
    }
    fn inc_announce(&self, outcome: &str) {
        get_metric!(ANNOUNCES_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
}

impl MetricsSink for PrometheusSink {}

static PROMETHEUS_SINK: PrometheusSink = PrometheusSink;
static INSTALL: std::sync::Once = std::sync::Once::new();

/// Registers every collector and installs the Prometheus sink as the global
/// one. Safe to call more than once; only the first call registers.
pub fn install() {
    INSTALL.call_once(install_inner);
}

fn install_inner() {
    let _ = DISPATCHES_TOTAL.set(
        register_int_counter_vec!(
            "haven_dispatches_total",
            "Total capability invocations dispatched",
            &["ability", "outcome"]
        )
        .expect("register_int_counter_vec"),
    );
    let _ = DISPATCH_DURATION_SECONDS.set(
        register_histogram_vec!(
            "haven_dispatch_duration_seconds",
            "Latency of capability dispatch (seconds)",
            &["ability"],
            exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register_histogram_vec"),
    );
    let _ = BLOB_BYTES_WRITTEN_TOTAL.set(
        register_int_counter!(
            "haven_blob_bytes_written_total",
            "Total verified blob bytes written"
        )
        .expect("register_int_counter"),
    );
    let _ = ALLOCATIONS_CREATED_TOTAL.set(
        register_int_counter!(
            "haven_allocations_created_total",
            "Total allocations created"
        )
        .expect("register_int_counter"),
    );
    let _ = COMMITMENTS_PERSISTED_TOTAL.set(
        register_int_counter!(
            "haven_commitments_persisted_total",
            "Total location commitments persisted"
        )
        .expect("register_int_counter"),
    );
    let _ = TRANSFER_ATTEMPTS_TOTAL.set(
        register_int_counter_vec!(
            "haven_transfer_attempts_total",
            "Replication transfer attempts by outcome",
            &["outcome"]
        )
        .expect("register_int_counter_vec"),
    );
    let _ = TRANSFER_DURATION_SECONDS.set(
        register_histogram_vec!(
            "haven_transfer_duration_seconds",
            "Duration of replication transfer attempts (seconds)",
            &["phase"],
            exponential_buckets(0.01, 2.0, 18).expect("buckets")
        )
        .expect("register_histogram_vec"),
    );
    let _ = REPLICATION_QUEUE_DEPTH.set(
        register_gauge!(
            "haven_replication_queue_depth",
            "Jobs currently queued or running"
        )
        .expect("register_gauge"),
    );
    let _ = ADVERTS_PUBLISHED_TOTAL.set(
        register_int_counter!(
            "haven_adverts_published_total",
            "Advertisement chain appends"
        )
        .expect("register_int_counter"),
    );
    let _ = ANNOUNCES_TOTAL.set(
        register_int_counter_vec!(
            "haven_announces_total",
            "Announce notifications by outcome",
            &["outcome"]
        )
        .expect("register_int_counter_vec"),
    );

    let _ = crate::sinks::SINK.set(&PROMETHEUS_SINK);
}

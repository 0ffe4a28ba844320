//! Prometheus metrics for the orchestration core.
//!
//! Metrics are registered to a custom registry with the "helmsman" prefix to
//! avoid name collisions with other libraries using the default Prometheus
//! registry. Registration errors are handled gracefully: if a metric fails
//! to register, an unregistered fallback is used instead of panicking, and
//! transition outcomes are never affected by reporting failures.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder, opts,
};
use tracing::warn;

/// Custom Prometheus registry for helmsman metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("helmsman".to_string()), None).unwrap_or_else(|_| Registry::new())
});

/// Transition task outcomes, keyed by (cluster, node, resource, transition)
/// where transition is "fromState--toState".
pub static TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "transitions_total",
        "Completed transition tasks",
        &["cluster", "node", "resource", "transition", "success"],
    )
});

/// Delay between message creation and the start of execution.
pub static TRANSITION_QUEUE_DELAY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec_safe(
        &REGISTRY,
        "transition_queue_delay_seconds",
        "Delay between message creation and execution start",
        &["cluster", "node", "resource", "transition"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0],
    )
});

/// Wall time spent inside transition logic plus persistence.
pub static TRANSITION_EXECUTION_DELAY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec_safe(
        &REGISTRY,
        "transition_execution_seconds",
        "Transition execution duration",
        &["cluster", "node", "resource", "transition"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0],
    )
});

/// Rebalance pipeline runs by outcome.
pub static PIPELINE_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "pipeline_runs_total",
        "Rebalance pipeline runs",
        &["cluster", "status"],
    )
});

/// Messages persisted to node queues by the pipeline.
pub static PIPELINE_MESSAGES_EMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "pipeline_messages_emitted_total",
        "Transition messages emitted by the pipeline",
    )
});

/// Candidate messages suppressed during message selection.
pub static PIPELINE_MESSAGES_SUPPRESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "pipeline_messages_suppressed_total",
        "Candidate messages suppressed during selection",
        &["reason"],
    )
});

/// Encode all helmsman metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "failed to register IntCounter, using unregistered fallback");
            counter
        }
    }
}

fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    let counter =
        IntCounterVec::new(opts!(name, help), labels).expect("metric opts should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "failed to register IntCounterVec, using unregistered fallback");
            counter
        }
    }
}

fn register_histogram_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let histogram =
        HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
            .expect("metric opts should be valid");
    match registry.register(Box::new(histogram.clone())) {
        Ok(()) => histogram,
        Err(e) => {
            warn!(name, error = %e, "failed to register HistogramVec, using unregistered fallback");
            histogram
        }
    }
}

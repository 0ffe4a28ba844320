//! Retry policies for coordination-store writes.
//!
//! All retries use `backon` exponential backoff with jitter. Reads are not
//! retried here: a failed snapshot read aborts the pipeline run, and the
//! next trigger retries naturally from a fresh snapshot.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::constants::DEFAULT_STORE_WRITE_ATTEMPTS;

/// Policy for coordination-store writes (message delivery, observed-state
/// persistence). Short delays; the per-partition lock is held across the
/// write, so long retries would stall the partition.
pub fn store_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(DEFAULT_STORE_WRITE_ATTEMPTS)
        .with_jitter()
}

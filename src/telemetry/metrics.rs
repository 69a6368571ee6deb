//! Metric instrument factories for jobq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"jobq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for jobq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("jobq")
}

/// Counter: claim attempts.
/// Labels: `result` ("claimed" | "not_found").
pub fn job_claims() -> Counter<u64> {
    meter()
        .u64_counter("jobq.job.claims")
        .with_description("Number of claim attempts")
        .build()
}

/// Counter: job status transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("jobq.job.state_transitions")
        .with_description("Number of job status transitions")
        .build()
}

/// Counter: task outcomes reported back to the core.
/// Labels: `path`, `outcome` ("success" | "retry" | "cancel" | "fatal").
pub fn job_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("jobq.job.outcomes")
        .with_description("Number of task outcomes by kind")
        .build()
}

/// Counter: queue-level operations (create, send).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("jobq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: store polls issued by `wait`.
pub fn wait_polls() -> Counter<u64> {
    meter()
        .u64_counter("jobq.job.wait_polls")
        .with_description("Number of store polls made while waiting on a job")
        .build()
}

/// Counter: records touched by maintenance sweeps.
/// Labels: `sweep` ("requeue_retries" | "purge_expired").
pub fn sweep_records() -> Counter<u64> {
    meter()
        .u64_counter("jobq.maintenance.records")
        .with_description("Records requeued or purged by maintenance sweeps")
        .build()
}

/// Histogram: task execution duration in milliseconds.
/// Labels: `path`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("jobq.job.duration_ms")
        .with_description("Task execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

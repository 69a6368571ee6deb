//! Job execution span helpers and the execution hook.
//!
//! Provides span creation and state-transition recording for jobs
//! flowing through the state machine.

use std::time::Duration;
use tracing::Span;

use crate::error::Error;
use crate::model::job::{JobId, JobRecord, Status};
use crate::task::TaskOutcome;

/// Start a span for job execution.
///
/// The `job.status` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_job_span(path: &str, job_id: &JobId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.path" = path,
        "job.id" = %job_id,
        "job.status" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the span and fills in
/// `job.status` with the new status.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    span.record("job.status", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}

/// Observer invoked around task execution.
///
/// Purely for instrumentation: hooks cannot alter the outcome.
pub trait ExecutionHook: Send + Sync {
    fn before(&self, job: &JobRecord);

    fn after(&self, job: &JobRecord, outcome: &TaskOutcome, elapsed: Duration);

    /// The task returned an error instead of an outcome.
    fn failed(&self, _job: &JobRecord, _error: &Error, _elapsed: Duration) {}
}

/// Hook that logs execution start and finish through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl ExecutionHook for TracingHook {
    fn before(&self, job: &JobRecord) {
        tracing::debug!(
            job_id = %job.id,
            path = %job.path,
            queue = %job.queue,
            timeout_ms = job.timeout.as_millis() as u64,
            "task starting"
        );
    }

    fn after(&self, job: &JobRecord, outcome: &TaskOutcome, elapsed: Duration) {
        tracing::info!(
            job_id = %job.id,
            path = %job.path,
            outcome = outcome.kind(),
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );
        if elapsed > job.timeout {
            tracing::warn!(
                job_id = %job.id,
                timeout_ms = job.timeout.as_millis() as u64,
                "task ran past its declared timeout"
            );
        }
    }

    fn failed(&self, job: &JobRecord, error: &Error, elapsed: Duration) {
        tracing::warn!(
            job_id = %job.id,
            path = %job.path,
            %error,
            elapsed_ms = elapsed.as_millis() as u64,
            "task failed"
        );
    }
}

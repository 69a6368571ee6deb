//! Integration tests for telemetry initialization, span helpers and hooks.

use jobq::model::job::{JobId, JobRecord, NewJob, Status};
use jobq::task::TaskOutcome;
use jobq::telemetry::job::{ExecutionHook, TracingHook};
use serde_json::json;
use std::time::Duration;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber per process; a second init returns Err,
    // which is acceptable here.
    let config = jobq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "jobq-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = jobq::telemetry::init_telemetry(config);
}

#[test]
fn job_span_creates_and_records_transition() {
    let id = JobId::new();
    let span = jobq::telemetry::job::start_job_span("tasks.echo", &id);
    jobq::telemetry::job::record_state_transition(&span, Status::Queued, Status::Started);
    jobq::telemetry::job::record_state_transition(&span, Status::Started, Status::Success);
}

#[test]
fn tracing_hook_handles_overrun() {
    let mut record = JobRecord::queued(JobId::new(), &NewJob::new("tasks.slow"));
    record.timeout = Duration::from_millis(10);

    let hook = TracingHook;
    hook.before(&record);
    hook.after(
        &record,
        &TaskOutcome::Success(json!(null)),
        Duration::from_millis(50),
    );
    hook.after(&record, &TaskOutcome::Cancel, Duration::from_millis(1));
    hook.failed(
        &record,
        &jobq::Error::Other("boom".to_string()),
        Duration::from_millis(5),
    );
}

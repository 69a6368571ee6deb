//! Outcome → status transition planning.
//!
//! Pure: given the loaded record, its task metadata, a task outcome and
//! the current time, decide what to write. No I/O happens here, so every
//! branch of the state machine is testable without a store.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Result;
use crate::model::job::{JobRecord, Status, StatusUpdate, after};
use crate::task::{TaskMeta, TaskOutcome};

/// What the job core will do for an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Persist this field bag.
    Write(StatusUpdate),
    /// Zero-countdown retry: skip the `retry` state and put the job
    /// straight back on a queue (`None` keeps the stored queue).
    Requeue {
        queue: Option<String>,
        retry_count: u32,
    },
}

/// The transition a reported outcome produced, as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Success,
    /// Parked until `dateretry`.
    Retry { dateretry: DateTime<Utc> },
    /// Back on `queue` immediately.
    Requeued { queue: String },
    Cancel,
    /// Outside the retry/cancel taxonomy; status untouched, traceback saved.
    Fatal(String),
}

impl Transition {
    pub fn status(&self) -> Option<Status> {
        match self {
            Transition::Success => Some(Status::Success),
            Transition::Retry { .. } => Some(Status::Retry),
            Transition::Requeued { .. } => Some(Status::Queued),
            Transition::Cancel => Some(Status::Cancel),
            Transition::Fatal(_) => None,
        }
    }
}

/// Decide the write for `outcome` on `record`.
pub fn plan(
    record: &JobRecord,
    meta: &TaskMeta,
    outcome: TaskOutcome,
    now: DateTime<Utc>,
) -> Result<Plan> {
    let plan = match outcome {
        TaskOutcome::Success(result) => Plan::Write(
            StatusUpdate::new(Status::Success, now)
                .result(result)
                .dateexpires(after(now, meta.result_ttl)?),
        ),

        TaskOutcome::Cancel => Plan::Write(cancel_update(meta, now)?),

        TaskOutcome::Fatal(error) => Plan::Write(StatusUpdate::unchanged(now).traceback(error)),

        TaskOutcome::Retry(_) if meta.cancel_on_retry => Plan::Write(cancel_update(meta, now)?),

        TaskOutcome::Retry(req) => {
            if let Some(max) = req.max_retries.filter(|max| record.retry_count >= *max) {
                let traceback = req
                    .traceback
                    .unwrap_or_else(|| format!("max retries ({max}) exceeded"));
                return Ok(Plan::Write(cancel_update(meta, now)?.traceback(traceback)));
            }

            let retry_count = record.retry_count + 1;
            let countdown = req.effective_countdown();
            if countdown == Duration::ZERO {
                return Ok(Plan::Requeue {
                    queue: req.queue,
                    retry_count,
                });
            }

            let mut update = StatusUpdate::new(Status::Retry, now)
                .dateretry(after(now, countdown)?)
                .retry_count(retry_count);
            if let Some(tb) = req.traceback {
                update = update.traceback(tb);
            }
            if let Some(queue) = req.queue.filter(|q| *q != record.queue) {
                update = update.queue(queue);
            }
            Plan::Write(update)
        }
    };
    Ok(plan)
}

fn cancel_update(meta: &TaskMeta, now: DateTime<Utc>) -> Result<StatusUpdate> {
    Ok(StatusUpdate::new(Status::Cancel, now).dateexpires(after(now, meta.result_ttl)?))
}

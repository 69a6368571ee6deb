//! Reconciliation sweeps.
//!
//! Nothing in the job core moves a `retry` record back onto a queue once
//! its `dateretry` passes, and nothing deletes expired terminal records.
//! These sweeps do both; run them periodically from any one process.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::job::{Job, WorkerContext};
use crate::store::JobStore;
use crate::telemetry::metrics;

/// Requeue up to `limit` retry-pending jobs whose `dateretry` is due.
///
/// Each job goes back onto the queue stored on its record. A job whose
/// status changed since the listing (another sweeper got there first) is
/// skipped. Returns how many this call requeued.
pub async fn requeue_due_retries(
    ctx: &WorkerContext,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<usize> {
    let due = ctx.store.due_retries(now, limit).await?;
    let mut requeued = 0;

    for record in due {
        let mut job = Job::from_record(ctx.clone(), record);
        match job.requeue(None).await {
            Ok(_) => requeued += 1,
            Err(Error::InvalidTransition { id, from, .. }) => {
                warn!(job_id = %id, from = %from, "retry already handled elsewhere; skipping");
            }
            Err(e) => return Err(e),
        }
    }

    if requeued > 0 {
        info!(count = requeued, "requeued due retries");
        metrics::sweep_records().add(
            requeued as u64,
            &[KeyValue::new("sweep", "requeue_retries")],
        );
    }
    Ok(requeued)
}

/// Delete terminal records whose `dateexpires` has passed.
pub async fn purge_expired(store: &dyn JobStore, now: DateTime<Utc>) -> Result<u64> {
    let purged = store.purge_expired(now).await?;
    if purged > 0 {
        info!(count = purged, "purged expired jobs");
        metrics::sweep_records().add(purged, &[KeyValue::new("sweep", "purge_expired")]);
    }
    Ok(purged)
}

//! In-process job store.
//!
//! Every operation runs inside one critical section of a tokio mutex, which
//! gives the same all-or-nothing semantics as a document store's
//! find-and-modify. Useful for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::job::*;

use super::JobStore;

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Overwrite a record wholesale, bypassing transition checks.
    /// Producers use this to seed state that did not come through a worker.
    pub async fn put(&self, record: JobRecord) {
        self.jobs.lock().await.insert(record.id, record);
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, new: NewJob) -> Result<JobRecord> {
        let record = JobRecord::queued(JobId::new(), &new);
        self.jobs.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn claim_and_start(
        &self,
        id: JobId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRecord>> {
        let mut jobs = self.jobs.lock().await;
        let Some(record) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        if record.status != Status::Queued {
            return Ok(None);
        }

        record.status = Status::Started;
        record.datestarted = Some(now);
        record.dateupdated = Some(now);
        record.worker = Some(worker_id.to_string());
        Ok(Some(record.clone()))
    }

    async fn fetch(&self, id: JobId, projection: Projection) -> Result<Option<JobRecord>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(&id).cloned().map(|r| r.project(projection)))
    }

    async fn update_status(
        &self,
        id: JobId,
        update: &StatusUpdate,
        _write_concern: WriteConcern,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&id).ok_or(Error::NotFound(id))?;

        let stale = update.expected.is_some_and(|e| e != record.status);
        let illegal = update
            .status
            .is_some_and(|to| !record.status.can_transition_to(to));
        if stale || illegal {
            return Err(Error::InvalidTransition {
                id,
                from: record.status.to_string(),
                to: update.status.unwrap_or(record.status),
            });
        }

        record.apply(update);
        Ok(())
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().await;
        let mut due: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.status == Status::Retry && r.dateretry.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.dateretry);
        due.truncate(limit);
        Ok(due)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, r| !r.dateexpires.is_some_and(|at| at <= now));
        Ok((before - jobs.len()) as u64)
    }
}

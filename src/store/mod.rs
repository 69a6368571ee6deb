//! Durable job store contract.
//!
//! The store is the only cross-worker synchronization point: claiming is a
//! single atomic conditional update, never an in-process lock, because the
//! competing workers live in separate processes or hosts.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::job::{JobId, JobRecord, NewJob, Projection, StatusUpdate, WriteConcern};

pub use memory::MemoryStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new `queued` record.
    async fn insert(&self, new: NewJob) -> Result<JobRecord>;

    /// Atomically claim a queued job for `worker_id`.
    ///
    /// Matches `id` with `status = queued` and, in the same step, sets
    /// `status = started`, `datestarted = now`, `worker = worker_id`.
    /// Returns `None` when the record is absent or not claimable (already
    /// started by someone else, cancelled, or finished). Never waits for a
    /// competing claim to resolve.
    async fn claim_and_start(
        &self,
        id: JobId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRecord>>;

    /// Non-mutating read.
    async fn fetch(&self, id: JobId, projection: Projection) -> Result<Option<JobRecord>>;

    /// Write a field bag in one statement.
    ///
    /// When `update.status` is set, the stored status must be a legal
    /// predecessor, and when `update.expected` is set it must equal it;
    /// otherwise the write is rejected with `InvalidTransition`.
    async fn update_status(
        &self,
        id: JobId,
        update: &StatusUpdate,
        write_concern: WriteConcern,
    ) -> Result<()>;

    /// Records parked in `retry` whose `dateretry` has passed, oldest first.
    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>>;

    /// Delete records whose `dateexpires` has passed. Returns the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

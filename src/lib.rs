//! # jobq
//!
//! Lifecycle core for asynchronous jobs: one durable record per job, an
//! atomic claim that lets exactly one worker start it, and a state machine
//! for success, retry with backoff (optionally onto another queue),
//! cancellation, and TTL-based expiry of finished records.
//!
//! Storage and queue publishing sit behind [`store::JobStore`] and
//! [`queue::QueueClient`]; Postgres + pgmq ([`db::Db`]) and in-memory
//! implementations are provided.

pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod maintenance;
pub mod model;
pub mod queue;
pub mod store;
pub mod task;
pub mod telemetry;

pub use error::{Error, Result};
pub use job::{Job, Transition, WorkerContext};
pub use model::job::{JobId, JobRecord, NewJob, Projection, Status, StatusUpdate, WriteConcern};
pub use queue::{MemoryQueue, QueueClient};
pub use store::{JobStore, MemoryStore};
pub use task::{RetryRequest, Task, TaskMeta, TaskOutcome, TaskRegistry};

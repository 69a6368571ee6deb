//! Queue publishing contract.
//!
//! From the job core's point of view a queue is enqueue-only: job ids are
//! appended for some consumer to pick up later. How consumers read is a
//! scheduler concern.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::job::JobId;

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Append job ids to the named queue. Fire-and-forget.
    async fn enqueue(&self, queue: &str, ids: &[JobId]) -> Result<()>;
}

/// In-process queue, one FIFO per queue name.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<JobId>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids waiting on `queue`, front first.
    pub async fn pending(&self, queue: &str) -> Vec<JobId> {
        let queues = self.queues.lock().await;
        queues
            .get(queue)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Take the next id from `queue`.
    pub async fn pop(&self, queue: &str) -> Option<JobId> {
        self.queues.lock().await.get_mut(queue)?.pop_front()
    }

    /// Remove and return everything waiting on `queue`.
    pub async fn drain(&self, queue: &str) -> Vec<JobId> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn enqueue(&self, queue: &str, ids: &[JobId]) -> Result<()> {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_default()
            .extend(ids.iter().copied());
        Ok(())
    }
}

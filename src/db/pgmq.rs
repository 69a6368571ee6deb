//! pgmq queue operations via direct SQLx.
//!
//! The job core only publishes (`pgmq.send_batch`). Reading is exposed for
//! schedulers and tests that need to see what was published.

use async_trait::async_trait;
use opentelemetry::KeyValue;

use crate::error::Result;
use crate::model::job::JobId;
use crate::queue::QueueClient;
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

impl PgmqMessage {
    /// The job id carried by a message published through [`QueueClient`].
    pub fn job_id(&self) -> Option<JobId> {
        self.message
            .get("job_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(self.pool())
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", queue_name.to_string()),
                KeyValue::new("operation", "create"),
            ],
        );
        Ok(())
    }

    /// Read the next message from a queue (visibility timeout in seconds).
    /// Returns None if queue is empty.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(self.pool())
        .await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", queue_name.to_string()),
                KeyValue::new(
                    "operation",
                    if row.is_some() { "read" } else { "read_empty" },
                ),
            ],
        );

        Ok(row.map(|(msg_id, read_ct, enqueued_at, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            message,
        }))
    }
}

#[async_trait]
impl QueueClient for super::Db {
    async fn enqueue(&self, queue: &str, ids: &[JobId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let payloads: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "job_id": id.to_string() }))
            .collect();

        sqlx::query("SELECT pgmq.send_batch($1, $2)")
            .bind(queue)
            .bind(&payloads)
            .execute(self.pool())
            .await?;

        metrics::queue_operations().add(
            ids.len() as u64,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("operation", "send"),
            ],
        );
        Ok(())
    }
}

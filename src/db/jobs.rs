//! `jobs` table: the Postgres [`JobStore`].
//!
//! Claiming is a single `UPDATE ... WHERE status = 'queued' RETURNING`,
//! so two workers racing on one id cannot both see a row come back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::job::*;
use crate::store::JobStore;

const FULL_COLUMNS: &str = "id, path, params, status, queue, worker, datestarted, dateupdated, \
     dateretry, dateexpires, result, traceback, totaltime_ms, retry_count";

const SUMMARY_COLUMNS: &str = "id, path, 'null'::jsonb AS params, status, queue, worker, \
     datestarted, dateupdated, dateretry, dateexpires, NULL::jsonb AS result, \
     NULL::text AS traceback, totaltime_ms, retry_count";

fn columns(projection: Projection) -> &'static str {
    match projection {
        Projection::Full => FULL_COLUMNS,
        Projection::Summary => SUMMARY_COLUMNS,
    }
}

#[async_trait]
impl JobStore for super::Db {
    async fn insert(&self, new: NewJob) -> Result<JobRecord> {
        let row: JobRow = sqlx::query_as(&format!(
            "INSERT INTO jobs (id, path, params, status, queue, dateupdated)
             VALUES ($1, $2, $3, 'queued', $4, $5)
             RETURNING {FULL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.path)
        .bind(&new.params)
        .bind(&new.queue)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        row.try_into_record()
    }

    async fn claim_and_start(
        &self,
        id: JobId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRecord>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET status = 'started', datestarted = $3, dateupdated = $3, worker = $2
             WHERE id = $1 AND status = 'queued'
             RETURNING {FULL_COLUMNS}"
        ))
        .bind(id.0)
        .bind(worker_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::try_into_record).transpose()
    }

    async fn fetch(&self, id: JobId, projection: Projection) -> Result<Option<JobRecord>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            columns(projection)
        ))
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::try_into_record).transpose()
    }

    async fn update_status(
        &self,
        id: JobId,
        update: &StatusUpdate,
        write_concern: WriteConcern,
    ) -> Result<()> {
        let predecessors: Vec<String> = update
            .status
            .map(|to| {
                Status::predecessors(to)
                    .into_iter()
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut tx = self.pool().begin().await?;
        if write_concern == WriteConcern::Relaxed {
            sqlx::query("SET LOCAL synchronous_commit = off")
                .execute(&mut *tx)
                .await?;
        }

        let rows_affected = sqlx::query(
            "UPDATE jobs SET
                status = COALESCE($2, status),
                queue = COALESCE($3, queue),
                result = CASE WHEN $4 THEN $5 ELSE COALESCE($5, result) END,
                traceback = CASE WHEN $4 THEN $6 ELSE COALESCE($6, traceback) END,
                dateretry = $7,
                dateexpires = $8,
                totaltime_ms = COALESCE($9, totaltime_ms),
                retry_count = COALESCE($10, retry_count),
                dateupdated = $11
             WHERE id = $1
               AND ($2::text IS NULL OR status = ANY($12))
               AND ($13::text IS NULL OR status = $13)",
        )
        .bind(id.0)
        .bind(update.status.map(|s| s.to_string()))
        .bind(&update.queue)
        .bind(update.clear_failure)
        .bind(&update.result)
        .bind(&update.traceback)
        .bind(update.dateretry)
        .bind(update.dateexpires)
        .bind(update.totaltime.map(|d| d.as_millis() as i64))
        .bind(update.retry_count.map(|n| n as i32))
        .bind(update.dateupdated)
        .bind(&predecessors)
        .bind(update.expected.map(|s| s.to_string()))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match current {
                None => Error::NotFound(id),
                Some((from,)) => {
                    let to = match update.status {
                        Some(to) => to,
                        None => from.parse()?,
                    };
                    Error::InvalidTransition { id, from, to }
                }
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {FULL_COLUMNS} FROM jobs
             WHERE status = 'retry' AND dateretry <= $1
             ORDER BY dateretry ASC
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_record).collect()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE dateexpires <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    path: String,
    params: serde_json::Value,
    status: String,
    queue: String,
    worker: Option<String>,
    datestarted: Option<DateTime<Utc>>,
    dateupdated: Option<DateTime<Utc>>,
    dateretry: Option<DateTime<Utc>>,
    dateexpires: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    traceback: Option<String>,
    totaltime_ms: Option<i64>,
    retry_count: i32,
}

impl JobRow {
    fn try_into_record(self) -> Result<JobRecord> {
        Ok(JobRecord {
            id: JobId(self.id),
            path: self.path,
            params: self.params,
            status: self.status.parse()?,
            queue: self.queue,
            worker: self.worker,
            datestarted: self.datestarted,
            dateupdated: self.dateupdated,
            dateretry: self.dateretry,
            dateexpires: self.dateexpires,
            result: self.result,
            traceback: self.traceback,
            totaltime: self
                .totaltime_ms
                .map(|ms| Duration::from_millis(ms.max(0) as u64)),
            retry_count: self.retry_count.max(0) as u32,
            timeout: DEFAULT_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
        })
    }
}

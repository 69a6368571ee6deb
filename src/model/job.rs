//! Job record types.
//!
//! A job is one unit of asynchronous work. Its record is created `queued`
//! by a producer, claimed by exactly one worker, and ends either terminal
//! (`success`, `cancel`) or parked in `retry` until it is requeued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default upper bound on task execution time.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default lifetime of a terminal record before it may be purged.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

// ---------------------------------------------------------------------------
// Job Record
// ---------------------------------------------------------------------------

/// One document per unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    /// Registry key of the task logic to run.
    pub path: String,

    /// Arguments handed to the task. `Null` under a summary projection.
    pub params: serde_json::Value,

    pub status: Status,

    /// Queue the job currently belongs to. Retries may move it.
    pub queue: String,

    /// Worker holding (or last holding) the claim.
    pub worker: Option<String>,

    pub datestarted: Option<DateTime<Utc>>,
    pub dateupdated: Option<DateTime<Utc>>,
    pub dateretry: Option<DateTime<Utc>>,

    /// Set exactly when status is `success` or `cancel`.
    pub dateexpires: Option<DateTime<Utc>>,

    /// Present only after `success`.
    pub result: Option<serde_json::Value>,

    /// Captured failure text from a retry, cancel-by-exhaustion or fatal outcome.
    pub traceback: Option<String>,

    /// Wall-clock time between claim and the latest status write.
    pub totaltime: Option<Duration>,

    /// Number of retries recorded so far.
    pub retry_count: u32,

    /// Resolved from task metadata on every fetch; never persisted.
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,

    /// Resolved from task metadata on every fetch; never persisted.
    #[serde(skip, default = "default_result_ttl")]
    pub result_ttl: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_result_ttl() -> Duration {
    DEFAULT_RESULT_TTL
}

impl JobRecord {
    /// Build the initial record for a freshly produced job.
    pub fn queued(id: JobId, new: &NewJob) -> Self {
        Self {
            id,
            path: new.path.clone(),
            params: new.params.clone(),
            status: Status::Queued,
            queue: new.queue.clone(),
            worker: None,
            datestarted: None,
            dateupdated: Some(Utc::now()),
            dateretry: None,
            dateexpires: None,
            result: None,
            traceback: None,
            totaltime: None,
            retry_count: 0,
            timeout: DEFAULT_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
        }
    }

    /// Apply a status update to this in-memory copy, mirroring what the
    /// store persists for the same update.
    pub fn apply(&mut self, update: &StatusUpdate) {
        if update.clear_failure {
            self.traceback = None;
            self.result = None;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref queue) = update.queue {
            self.queue = queue.clone();
        }
        if update.result.is_some() {
            self.result = update.result.clone();
        }
        if update.traceback.is_some() {
            self.traceback = update.traceback.clone();
        }
        if update.totaltime.is_some() {
            self.totaltime = update.totaltime;
        }
        if let Some(n) = update.retry_count {
            self.retry_count = n;
        }
        self.dateretry = update.dateretry;
        self.dateexpires = update.dateexpires;
        self.dateupdated = Some(update.dateupdated);
    }

    /// Keep only the fields a summary projection returns.
    pub fn project(mut self, projection: Projection) -> Self {
        if projection == Projection::Summary {
            self.params = serde_json::Value::Null;
            self.result = None;
            self.traceback = None;
        }
        self
    }
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|e| Error::Other(format!("invalid job id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting on a queue for a worker.
    Queued,
    /// Claimed by a worker and executing.
    Started,
    /// Finished normally. Terminal.
    Success,
    /// Failed, parked until `dateretry`.
    Retry,
    /// Abandoned. Terminal.
    Cancel,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Queued,
        Status::Started,
        Status::Success,
        Status::Retry,
        Status::Cancel,
    ];

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Queued, Started)
                | (Queued, Cancel)    // cancelled before any worker picked it up
                | (Started, Success)
                | (Started, Retry)
                | (Started, Cancel)
                | (Started, Queued)   // zero-countdown retry
                | (Retry, Queued)
                | (Retry, Cancel)
        )
    }

    /// States from which `to` may be entered.
    pub fn predecessors(to: Status) -> Vec<Status> {
        Status::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(to))
            .collect()
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Cancel)
    }

    /// Has the job left the queued/started phase (terminal or retry-pending)?
    pub fn is_settled(self) -> bool {
        !matches!(self, Status::Queued | Status::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Started => "started",
            Status::Success => "success",
            Status::Retry => "retry",
            Status::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Status::Queued),
            "started" => Ok(Status::Started),
            "success" => Ok(Status::Success),
            "retry" => Ok(Status::Retry),
            "cancel" => Ok(Status::Cancel),
            other => Err(Error::Other(format!("unknown job status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status Update
// ---------------------------------------------------------------------------

/// Field bag written by a single `update_status` call.
///
/// `dateretry` and `dateexpires` are always written (a `None` clears them),
/// which keeps `dateexpires` in lockstep with terminal statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<Status>,
    /// Only apply if the stored status still equals this one.
    pub expected: Option<Status>,
    pub queue: Option<String>,
    pub result: Option<serde_json::Value>,
    pub traceback: Option<String>,
    pub dateretry: Option<DateTime<Utc>>,
    pub dateexpires: Option<DateTime<Utc>>,
    pub totaltime: Option<Duration>,
    pub retry_count: Option<u32>,
    pub dateupdated: DateTime<Utc>,
    /// Drop `result` and `traceback` left over from a previous attempt.
    pub clear_failure: bool,
}

impl StatusUpdate {
    pub fn new(status: Status, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            ..Self::unchanged(now)
        }
    }

    /// An update that leaves `status` alone.
    pub fn unchanged(now: DateTime<Utc>) -> Self {
        Self {
            status: None,
            expected: None,
            queue: None,
            result: None,
            traceback: None,
            dateretry: None,
            dateexpires: None,
            totaltime: None,
            retry_count: None,
            dateupdated: now,
            clear_failure: false,
        }
    }

    pub fn expect_status(mut self, status: Status) -> Self {
        self.expected = Some(status);
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn dateretry(mut self, at: DateTime<Utc>) -> Self {
        self.dateretry = Some(at);
        self
    }

    pub fn dateexpires(mut self, at: DateTime<Utc>) -> Self {
        self.dateexpires = Some(at);
        self
    }

    pub fn totaltime(mut self, totaltime: Option<Duration>) -> Self {
        self.totaltime = totaltime;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    pub fn clear_failure(mut self) -> Self {
        self.clear_failure = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Store options
// ---------------------------------------------------------------------------

/// Which fields a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every persisted field.
    #[default]
    Full,
    /// Lifecycle fields only: `params`, `result` and `traceback` are omitted.
    Summary,
}

/// How long a status write waits before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    /// Return once the write is durable.
    #[default]
    Durable,
    /// Return once the write is applied; durability may lag.
    Relaxed,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for producing new jobs.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub(crate) path: String,
    pub(crate) params: serde_json::Value,
    pub(crate) queue: String,
}

impl NewJob {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: serde_json::json!({}),
            queue: "default".to_string(),
        }
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }
}

/// Add a std duration to a timestamp.
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> Result<DateTime<Utc>> {
    let delta = chrono::TimeDelta::from_std(delay)
        .map_err(|e| Error::Other(format!("duration out of range: {e}")))?;
    now.checked_add_signed(delta)
        .ok_or_else(|| Error::Other(format!("timestamp overflow adding {delay:?}")))
}

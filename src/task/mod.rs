//! Task capability and execution outcomes.
//!
//! Task code never signals retry or cancel by unwinding; it returns a
//! [`TaskOutcome`] and the job state machine turns that value into a
//! status transition.

pub mod registry;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::model::job::{DEFAULT_RESULT_TTL, DEFAULT_TIMEOUT};

pub use registry::TaskRegistry;

/// Delay applied to a retry that does not name its own countdown.
pub const DEFAULT_RETRY_COUNTDOWN: Duration = Duration::from_secs(24 * 3600);

/// Executable task logic, registered under a path at startup.
///
/// Return `Err` for infrastructure failures (`?` on store or I/O calls);
/// transient ones are retried with the default countdown, the rest are
/// reported as fatal.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, params: &serde_json::Value) -> Result<TaskOutcome>;
}

/// What a task execution asks the job core to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Finished normally with a result to persist.
    Success(serde_json::Value),
    /// Try again later, possibly on another queue.
    Retry(RetryRequest),
    /// Give up. No result is persisted.
    Cancel,
    /// Failed outside the retry/cancel taxonomy. The status is left as is
    /// and the caller decides what happens to the job.
    Fatal(String),
}

impl TaskOutcome {
    pub fn success(result: serde_json::Value) -> Self {
        TaskOutcome::Success(result)
    }

    pub fn retry() -> Self {
        TaskOutcome::Retry(RetryRequest::default())
    }

    pub fn fatal(error: impl std::fmt::Display) -> Self {
        TaskOutcome::Fatal(error.to_string())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutcome::Success(_) => "success",
            TaskOutcome::Retry(_) => "retry",
            TaskOutcome::Cancel => "cancel",
            TaskOutcome::Fatal(_) => "fatal",
        }
    }
}

/// Parameters of a retry signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryRequest {
    /// Queue to move the job to. `None` keeps its current queue.
    pub queue: Option<String>,
    /// Delay before the job is eligible again. `None` means the default.
    pub countdown: Option<Duration>,
    /// Give up once this many retries have been recorded.
    pub max_retries: Option<u32>,
    /// Failure text persisted as the record's traceback.
    pub traceback: Option<String>,
}

impl RetryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn countdown(mut self, countdown: Duration) -> Self {
        self.countdown = Some(countdown);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Countdown with the default filled in.
    pub fn effective_countdown(&self) -> Duration {
        self.countdown.unwrap_or(DEFAULT_RETRY_COUNTDOWN)
    }
}

impl From<RetryRequest> for TaskOutcome {
    fn from(req: RetryRequest) -> Self {
        TaskOutcome::Retry(req)
    }
}

/// Declared metadata for a task path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMeta {
    /// Upper bound on execution time. Enforced by the worker, recorded here.
    pub timeout: Duration,
    /// How long a terminal record lives before it may be purged.
    pub result_ttl: Duration,
    /// Convert every retry of this task into a cancel.
    pub cancel_on_retry: bool,
}

impl Default for TaskMeta {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
            cancel_on_retry: false,
        }
    }
}

/// Metadata entry as written in a tasks file. Missing fields keep defaults.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskMetaEntry {
    pub path: String,
    pub timeout_secs: Option<u64>,
    pub result_ttl_secs: Option<u64>,
    #[serde(default)]
    pub cancel_on_retry: bool,
}

impl TaskMetaEntry {
    pub(crate) fn into_meta(self) -> (String, TaskMeta) {
        let defaults = TaskMeta::default();
        let meta = TaskMeta {
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            result_ttl: self
                .result_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_ttl),
            cancel_on_retry: self.cancel_on_retry,
        };
        (self.path, meta)
    }
}

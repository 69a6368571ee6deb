//! The job state machine.
//!
//! A [`Job`] wraps one record and drives it through
//! `queued → started → {success, retry, cancel}` and `retry → queued`.
//! Everything it knows about the outside world arrives through a
//! [`WorkerContext`]: the store, the queue publisher, the task registry and
//! an optional execution hook.

pub mod transition;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, debug, info, warn};

use crate::error::{Error, Result};
use crate::model::job::*;
use crate::queue::QueueClient;
use crate::store::JobStore;
use crate::task::{RetryRequest, TaskMeta, TaskOutcome, TaskRegistry};
use crate::telemetry::job::{ExecutionHook, record_state_transition, start_job_span};
use crate::telemetry::metrics;

pub use transition::{Plan, Transition};

/// Everything a job needs from the process running it.
#[derive(Clone)]
pub struct WorkerContext {
    pub worker_id: String,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn QueueClient>,
    pub registry: Arc<TaskRegistry>,
    pub hook: Option<Arc<dyn ExecutionHook>>,
}

impl WorkerContext {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueClient>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            queue,
            registry,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Claim `id`, run its task and report the outcome.
    ///
    /// Returns `None` when the job was not claimable.
    pub async fn process(&self, id: JobId) -> Result<Option<Transition>> {
        let mut job = Job::new(self.clone(), id);
        if job.fetch(true, Projection::Full).await?.is_none() {
            return Ok(None);
        }
        job.run().await.map(Some)
    }
}

/// One job, bound to a worker context.
pub struct Job {
    id: JobId,
    ctx: WorkerContext,
    data: Option<JobRecord>,
    span: Span,
}

impl Job {
    pub fn new(ctx: WorkerContext, id: JobId) -> Self {
        Self {
            id,
            ctx,
            data: None,
            span: Span::none(),
        }
    }

    /// Bind to a record already read from the store.
    pub fn from_record(ctx: WorkerContext, record: JobRecord) -> Self {
        let mut job = Self::new(ctx, record.id);
        job.load(record);
        job
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// The loaded record, if any.
    pub fn data(&self) -> Option<&JobRecord> {
        self.data.as_ref()
    }

    /// Metadata for the loaded task path (defaults when nothing is loaded).
    pub fn meta(&self) -> TaskMeta {
        self.data
            .as_ref()
            .map(|d| self.ctx.registry.meta(&d.path))
            .unwrap_or_default()
    }

    fn loaded(&self) -> Result<&JobRecord> {
        self.data.as_ref().ok_or(Error::NotLoaded(self.id))
    }

    fn load(&mut self, mut record: JobRecord) {
        let meta = self.ctx.registry.meta(&record.path);
        record.timeout = meta.timeout;
        record.result_ttl = meta.result_ttl;
        if self.span.is_none() {
            self.span = start_job_span(&record.path, &self.id);
        }
        self.data = Some(record);
    }

    /// Like [`Job::fetch`] without claiming, but absence is an error.
    async fn reload(&mut self, projection: Projection) -> Result<&JobRecord> {
        let id = self.id;
        self.fetch(false, projection)
            .await?
            .ok_or(Error::NotFound(id))
    }

    // -----------------------------------------------------------------------
    // Fetch / claim
    // -----------------------------------------------------------------------

    /// Load the record.
    ///
    /// With `start`, atomically claims it for this worker (`queued →
    /// started`). `None` means the job is absent or not runnable and must
    /// not be executed. Without `start`, this is a side-effect-free read.
    pub async fn fetch(
        &mut self,
        start: bool,
        projection: Projection,
    ) -> Result<Option<&JobRecord>> {
        let record = if start {
            let claimed = self
                .ctx
                .store
                .claim_and_start(self.id, &self.ctx.worker_id, Utc::now())
                .await?;
            metrics::job_claims().add(
                1,
                &[KeyValue::new(
                    "result",
                    if claimed.is_some() { "claimed" } else { "not_found" },
                )],
            );
            match claimed {
                Some(r) => {
                    debug!(job_id = %self.id, worker = %self.ctx.worker_id, "job claimed");
                    metrics::job_state_transitions().add(
                        1,
                        &[KeyValue::new("from", "queued"), KeyValue::new("to", "started")],
                    );
                    Some(r.project(projection))
                }
                None => {
                    debug!(job_id = %self.id, "job not claimable");
                    None
                }
            }
        } else {
            self.ctx.store.fetch(self.id, projection).await?
        };

        match record {
            Some(record) => {
                self.load(record);
                if start {
                    record_state_transition(&self.span, Status::Queued, Status::Started);
                }
                Ok(self.data.as_ref())
            }
            None => {
                self.data = None;
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the task for the loaded record and persist its outcome.
    ///
    /// Errors from the task (or from resolving it) propagate unchanged and
    /// leave the record as it was; [`Job::run`] is the variant that maps
    /// them onto a transition.
    pub async fn perform(&mut self) -> Result<Transition> {
        let outcome = self.execute().await?;
        self.complete(outcome).await
    }

    /// Run the task for the loaded record and return its outcome.
    ///
    /// Nothing is persisted here; pass the outcome to [`Job::complete`].
    /// The record must have been fetched with a full projection so that
    /// `params` is present.
    pub async fn execute(&self) -> Result<TaskOutcome> {
        let record = self.loaded()?;
        let registered = self.ctx.registry.resolve(&record.path)?;

        if let Some(ref hook) = self.ctx.hook {
            hook.before(record);
        }

        let start = Instant::now();
        let result = registered
            .task
            .run(&record.params)
            .instrument(self.span.clone())
            .await;
        let elapsed = start.elapsed();

        metrics::job_duration_ms().record(
            elapsed.as_secs_f64() * 1000.0,
            &[KeyValue::new("path", record.path.clone())],
        );

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %self.id, path = %record.path, error = %e, "task returned an error");
                if let Some(ref hook) = self.ctx.hook {
                    hook.failed(record, &e, elapsed);
                }
                metrics::job_outcomes().add(
                    1,
                    &[
                        KeyValue::new("path", record.path.clone()),
                        KeyValue::new("outcome", "error"),
                    ],
                );
                return Err(e);
            }
        };

        if let Some(ref hook) = self.ctx.hook {
            hook.after(record, &outcome, elapsed);
        }

        metrics::job_outcomes().add(
            1,
            &[
                KeyValue::new("path", record.path.clone()),
                KeyValue::new("outcome", outcome.kind()),
            ],
        );

        Ok(outcome)
    }

    /// Persist the transition for `outcome`.
    pub async fn complete(&mut self, outcome: TaskOutcome) -> Result<Transition> {
        let now = Utc::now();
        let plan = transition::plan(self.loaded()?, &self.meta(), outcome, now)?;

        match plan {
            Plan::Requeue { queue, retry_count } => {
                let queue = self.requeue_inner(queue, Some(retry_count)).await?;
                Ok(Transition::Requeued { queue })
            }
            Plan::Write(update) => {
                let transition = match update.status {
                    Some(Status::Success) => Transition::Success,
                    Some(Status::Cancel) => Transition::Cancel,
                    Some(Status::Retry) => Transition::Retry {
                        dateretry: update.dateretry.unwrap_or(now),
                    },
                    _ => Transition::Fatal(update.traceback.clone().unwrap_or_default()),
                };
                if let Transition::Fatal(ref error) = transition {
                    warn!(job_id = %self.id, %error, "task failed outside retry/cancel; status left unchanged");
                }
                self.save_status(update, WriteConcern::Durable).await?;
                Ok(transition)
            }
        }
    }

    /// [`Job::perform`] with task errors routed through
    /// [`Job::handle_error`]. Store errors while persisting the outcome
    /// still propagate.
    pub async fn run(&mut self) -> Result<Transition> {
        match self.execute().await {
            Ok(outcome) => self.complete(outcome).await,
            Err(e @ Error::NotLoaded(_)) => Err(e),
            Err(e) => self.handle_error(&e).await,
        }
    }

    /// Map an error raised around task execution onto a transition.
    ///
    /// Transient errors retry with the default countdown and the error
    /// text as traceback; anything else is recorded as fatal.
    pub async fn handle_error(&mut self, error: &Error) -> Result<Transition> {
        let outcome = if error.is_transient() {
            TaskOutcome::Retry(RetryRequest::new().traceback(error.to_string()))
        } else {
            TaskOutcome::fatal(error)
        };
        self.complete(outcome).await
    }

    // -----------------------------------------------------------------------
    // Status writes
    // -----------------------------------------------------------------------

    /// Write `update` in one store call and mirror it onto the loaded record.
    ///
    /// With a loaded record the write only lands if the stored status
    /// still matches it. Fills `totaltime` from `datestarted` when the job
    /// is running and the update does not carry its own.
    pub async fn save_status(
        &mut self,
        mut update: StatusUpdate,
        write_concern: WriteConcern,
    ) -> Result<()> {
        let from = self.data.as_ref().map(|d| d.status);
        if update.expected.is_none() {
            update.expected = from;
        }

        if update.totaltime.is_none() {
            update.totaltime = self
                .data
                .as_ref()
                .filter(|d| d.status == Status::Started)
                .and_then(|d| d.datestarted)
                .and_then(|started| elapsed_between(started, update.dateupdated));
        }

        self.ctx
            .store
            .update_status(self.id, &update, write_concern)
            .await?;

        if let Some(ref mut record) = self.data {
            record.apply(&update);
        }

        if let Some(to) = update.status {
            let from_label = from.map(|s| s.as_str()).unwrap_or("unknown");
            metrics::job_state_transitions().add(
                1,
                &[KeyValue::new("from", from_label), KeyValue::new("to", to.as_str())],
            );
            match from {
                Some(from) => record_state_transition(&self.span, from, to),
                None => info!(job_id = %self.id, to = %to, "state_transition"),
            }
        }
        Ok(())
    }

    /// Mark the job successful with `result`.
    pub async fn save_success(&mut self, result: serde_json::Value) -> Result<Transition> {
        self.complete(TaskOutcome::Success(result)).await
    }

    /// Record a retry. A zero countdown requeues immediately instead of
    /// parking the job in `retry`.
    pub async fn save_retry(&mut self, request: RetryRequest) -> Result<Transition> {
        self.complete(TaskOutcome::Retry(request)).await
    }

    /// Build the retry signal for this job's task.
    ///
    /// Tasks declared `cancel_on_retry` get a cancel instead. A missing
    /// countdown is filled with the 24h default.
    pub fn retry(&self, request: RetryRequest) -> TaskOutcome {
        if self.meta().cancel_on_retry {
            return TaskOutcome::Cancel;
        }
        let countdown = request.effective_countdown();
        TaskOutcome::Retry(request.countdown(countdown))
    }

    /// Mark the job cancelled. Loads the record first if needed.
    ///
    /// Only the record changes: a task already executing elsewhere keeps
    /// running, but no later claim will pick the job up.
    pub async fn cancel(&mut self) -> Result<Transition> {
        if self.data.is_none() {
            self.reload(Projection::Summary).await?;
        }
        self.complete(TaskOutcome::Cancel).await
    }

    // -----------------------------------------------------------------------
    // Requeue
    // -----------------------------------------------------------------------

    /// Put the job back on a queue: `queue`, else the stored queue.
    /// Returns the queue used.
    ///
    /// Two separate steps: the status write, then the enqueue. A crash in
    /// between leaves a record that reads `queued` but sits on no queue
    /// until a reconciliation sweep re-enqueues it. Delivery is therefore
    /// at-least-once at best, never exactly-once.
    pub async fn requeue(&mut self, queue: Option<&str>) -> Result<String> {
        self.requeue_inner(queue.map(str::to_string), None).await
    }

    async fn requeue_inner(
        &mut self,
        queue: Option<String>,
        retry_count: Option<u32>,
    ) -> Result<String> {
        let queue = match queue {
            Some(q) => q,
            None => self.stored_queue().await?,
        };

        let mut update = StatusUpdate::new(Status::Queued, Utc::now())
            .queue(queue.clone())
            .clear_failure();
        if let Some(n) = retry_count {
            update = update.retry_count(n);
        }
        self.save_status(update, WriteConcern::Durable).await?;

        // Not atomic with the write above; see the doc comment.
        self.ctx.queue.enqueue(&queue, &[self.id]).await?;
        info!(job_id = %self.id, queue = %queue, "job requeued");

        Ok(queue)
    }

    async fn stored_queue(&mut self) -> Result<String> {
        if let Some(ref d) = self.data {
            return Ok(d.queue.clone());
        }
        Ok(self.reload(Projection::Summary).await?.queue.clone())
    }

    // -----------------------------------------------------------------------
    // Wait
    // -----------------------------------------------------------------------

    /// Poll every `poll_interval` until the job is neither `queued` nor
    /// `started`, then return the record.
    ///
    /// Fails with `WaitTimeout` once `timeout` has elapsed. Holds nothing
    /// in the store between polls.
    pub async fn wait(
        &mut self,
        poll_interval: Duration,
        timeout: Option<Duration>,
        projection: Projection,
    ) -> Result<JobRecord> {
        let started = Instant::now();
        loop {
            metrics::wait_polls().add(1, &[]);
            let record = self.reload(projection).await?;
            if record.status.is_settled() {
                return Ok(record.clone());
            }

            let waited = started.elapsed();
            let sleep_for = match timeout {
                Some(limit) if waited >= limit => {
                    return Err(Error::WaitTimeout {
                        id: self.id,
                        waited_ms: waited.as_millis() as u64,
                    });
                }
                Some(limit) => poll_interval.min(limit - waited),
                None => poll_interval,
            };
            tokio::time::sleep(sleep_for).await;
        }
    }
}

fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Duration> {
    (end - start).to_std().ok()
}

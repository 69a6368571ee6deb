//! Polling wait on job completion.

use async_trait::async_trait;
use jobq::job::{Job, WorkerContext};
use jobq::model::job::{NewJob, Projection, Status};
use jobq::queue::MemoryQueue;
use jobq::store::{JobStore, MemoryStore};
use jobq::task::{Task, TaskOutcome, TaskRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Slow;

#[async_trait]
impl Task for Slow {
    async fn run(&self, _params: &serde_json::Value) -> jobq::Result<TaskOutcome> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(TaskOutcome::success(json!("done")))
    }
}

fn context(store: Arc<MemoryStore>) -> WorkerContext {
    let mut registry = TaskRegistry::empty();
    registry.register("tasks.slow", Slow);
    WorkerContext::new(
        "worker-1",
        store,
        Arc::new(MemoryQueue::new()),
        Arc::new(registry),
    )
}

#[tokio::test]
async fn wait_returns_once_job_finishes() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone());
    let record = store.insert(NewJob::new("tasks.slow")).await.unwrap();

    let worker = ctx.clone();
    let handle = tokio::spawn(async move { worker.process(record.id).await });

    let mut waiter = Job::new(ctx, record.id);
    let done = waiter
        .wait(
            Duration::from_millis(10),
            Some(Duration::from_secs(5)),
            Projection::Full,
        )
        .await
        .unwrap();
    assert_eq!(done.status, Status::Success);
    assert_eq!(done.result, Some(json!("done")));

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn wait_times_out_on_queued_job() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone());
    let record = store.insert(NewJob::new("tasks.slow")).await.unwrap();

    let mut waiter = Job::new(ctx, record.id);
    let err = waiter
        .wait(
            Duration::from_millis(10),
            Some(Duration::from_millis(50)),
            Projection::Summary,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, jobq::Error::WaitTimeout { id, .. } if id == record.id));
}

#[tokio::test]
async fn wait_on_retry_returns_immediately() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone());
    let mut record = store.insert(NewJob::new("tasks.slow")).await.unwrap();
    record.status = Status::Retry;
    store.put(record.clone()).await;

    let mut waiter = Job::new(ctx, record.id);
    let seen = waiter
        .wait(Duration::from_secs(60), None, Projection::Summary)
        .await
        .unwrap();
    assert_eq!(seen.status, Status::Retry);
}

#[tokio::test]
async fn wait_on_missing_job_fails() {
    let store = Arc::new(MemoryStore::new());
    let mut waiter = Job::new(context(store), jobq::JobId::new());
    let err = waiter
        .wait(Duration::from_millis(10), None, Projection::Summary)
        .await
        .unwrap_err();
    assert!(matches!(err, jobq::Error::NotFound(_)));
}

//! Claim exclusivity against the in-memory store.

use async_trait::async_trait;
use jobq::job::{Job, WorkerContext};
use jobq::model::job::{NewJob, Projection, Status};
use jobq::queue::MemoryQueue;
use jobq::store::{JobStore, MemoryStore};
use jobq::task::{Task, TaskOutcome, TaskRegistry};
use std::sync::Arc;

struct Noop;

#[async_trait]
impl Task for Noop {
    async fn run(&self, _params: &serde_json::Value) -> jobq::Result<TaskOutcome> {
        Ok(TaskOutcome::success(serde_json::Value::Null))
    }
}

fn context(worker: &str, store: Arc<MemoryStore>) -> WorkerContext {
    let mut registry = TaskRegistry::empty();
    registry.register("tasks.noop", Noop);
    WorkerContext::new(
        worker,
        store,
        Arc::new(MemoryQueue::new()),
        Arc::new(registry),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let record = store.insert(NewJob::new("tasks.noop")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ctx = context(&format!("worker-{i}"), store.clone());
        handles.push(tokio::spawn(async move {
            let mut job = Job::new(ctx, record.id);
            job.fetch(true, Projection::Full)
                .await
                .unwrap()
                .map(|r| r.worker.clone())
        }));
    }

    let mut winners = Vec::new();
    for h in handles {
        if let Some(worker) = h.await.unwrap() {
            winners.push(worker);
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = store
        .fetch(record.id, Projection::Full)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, Status::Started);
    assert_eq!(stored.worker, winners[0]);
}

#[tokio::test]
async fn claim_after_success_returns_none() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context("worker-1", store.clone());
    let record = store.insert(NewJob::new("tasks.noop")).await.unwrap();

    assert!(ctx.process(record.id).await.unwrap().is_some());

    let mut job = Job::new(ctx.clone(), record.id);
    assert!(job.fetch(true, Projection::Full).await.unwrap().is_none());
    assert!(job.data().is_none());
}

#[tokio::test]
async fn claim_of_started_job_does_not_steal_it() {
    let store = Arc::new(MemoryStore::new());
    let record = store.insert(NewJob::new("tasks.noop")).await.unwrap();

    let mut first = Job::new(context("worker-1", store.clone()), record.id);
    assert!(first.fetch(true, Projection::Full).await.unwrap().is_some());

    let mut second = Job::new(context("worker-2", store.clone()), record.id);
    assert!(second.fetch(true, Projection::Full).await.unwrap().is_none());

    let stored = store
        .fetch(record.id, Projection::Summary)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.worker.as_deref(), Some("worker-1"));
}

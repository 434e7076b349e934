use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PortfolioError, Result};

/// Asynchronous execution substrate for named batch jobs. The core only
/// depends on "enqueue, await completion, receive a typed result"; durability
/// and ordering are the queue's own business.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, name: &str, payload: Value) -> Result<JobHandle>;
    async fn await_completion(&self, handle: JobHandle) -> Result<Value>;
}

/// Work executed by the queue for one job name.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: Value) -> Result<Value>;
}

pub struct JobHandle {
    id: Uuid,
    rx: oneshot::Receiver<Result<Value>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// In-process queue backed by spawned tokio tasks. Jobs run off the caller's
/// request path; completion is delivered over a oneshot channel.
#[derive(Default)]
pub struct LocalJobQueue {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.write().await.insert(name.to_string(), handler);
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, name: &str, payload: Value) -> Result<JobHandle> {
        let handler = self
            .handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PortfolioError::Queue(format!("no handler for job '{}'", name)))?;

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        debug!(job = name, id = %id, "enqueueing job");

        tokio::spawn(async move {
            let outcome = handler.run(payload).await;
            // Receiver dropped means the caller abandoned the job; discard.
            let _ = tx.send(outcome);
        });

        Ok(JobHandle { id, rx })
    }

    async fn await_completion(&self, handle: JobHandle) -> Result<Value> {
        handle
            .rx
            .await
            .map_err(|_| PortfolioError::Queue("job worker dropped before completion".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl JobHandler for Doubler {
        async fn run(&self, payload: Value) -> Result<Value> {
            let n = payload["n"].as_u64().unwrap_or(0);
            Ok(json!(n * 2))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn run(&self, _payload: Value) -> Result<Value> {
            Err(PortfolioError::Queue("worker blew up".to_string()))
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_await_returns_handler_result() {
        let queue = LocalJobQueue::new();
        queue.register("double", Arc::new(Doubler)).await;

        let handle = queue.enqueue("double", json!({ "n": 21 })).await.unwrap();
        let result = queue.await_completion(handle).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn test_handler_failure_surfaces_to_caller() {
        let queue = LocalJobQueue::new();
        queue.register("boom", Arc::new(AlwaysFails)).await;

        let handle = queue.enqueue("boom", json!({})).await.unwrap();
        let result = queue.await_completion(handle).await;
        assert!(matches!(result, Err(PortfolioError::Queue(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_name_is_rejected_at_enqueue() {
        let queue = LocalJobQueue::new();
        let result = queue.enqueue("missing", json!({})).await;
        assert!(matches!(result, Err(PortfolioError::Queue(_))));
    }
}

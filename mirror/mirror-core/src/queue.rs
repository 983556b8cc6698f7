//! Single-concurrency FIFO task queue.
//!
//! Tasks run one at a time in the order they were enqueued. The next task starts only
//! after the previous one settled, whether it returned an error or panicked.

use crate::error::{MirrorError, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A queue drained by a single worker task.
pub struct TaskQueue {
    name: &'static str,
    sender: mpsc::UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl TaskQueue {
    /// Create a queue and spawn its worker on the current runtime.
    pub fn new(name: &'static str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = pending.clone();
        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    error!(queue = name, "Queued task panicked");
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            debug!(queue = name, "Task queue drained and closed");
        });

        Self {
            name,
            sender,
            pending,
            worker,
        }
    }

    /// Enqueue a task. The task is placed in the queue before this returns, so the
    /// order of `enqueue` calls is the order of execution. The returned future resolves
    /// with the task's own result once it ran.
    pub fn enqueue<F, T>(&self, task: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let wrapped: Task = Box::pin(async move {
            let _ = result_tx.send(task.await);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let sent = self.sender.send(wrapped);
        if sent.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        let name = self.name;
        async move {
            sent.map_err(|_| MirrorError::QueueClosed(name.to_string()))?;
            result_rx
                .await
                .map_err(|_| MirrorError::internal(format!("task in queue \"{name}\" did not complete")))?
        }
    }

    /// Number of tasks enqueued and not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the worker. Tasks still queued are dropped.
    pub fn close(&self) {
        self.worker.abort();
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_in_enqueue_order() {
        let queue = TaskQueue::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = [30u64, 10, 0]
            .into_iter()
            .enumerate()
            .map(|(i, delay)| {
                let log = log.clone();
                queue.enqueue(async move {
                    log.lock().push(format!("start {i}"));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().push(format!("end {i}"));
                    Ok(i)
                })
            })
            .collect();

        let results = futures::future::join_all(futures).await;
        let results: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(
            *log.lock(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_error_does_not_block_next_task() {
        let queue = TaskQueue::new("test");

        let failing = queue.enqueue(async { Err::<(), _>(MirrorError::internal("boom")) });
        let succeeding = queue.enqueue(async { Ok(7) });

        assert!(failing.await.is_err());
        assert_eq!(succeeding.await.unwrap(), 7);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_panic_does_not_block_next_task() {
        let queue = TaskQueue::new("test");

        let panicking = queue.enqueue(async {
            if true {
                panic!("task panicked");
            }
            Ok(())
        });
        let succeeding = queue.enqueue(async { Ok("after") });

        assert!(panicking.await.is_err());
        assert_eq!(succeeding.await.unwrap(), "after");
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let queue = TaskQueue::new("test");
        queue.close();
        tokio::task::yield_now().await;

        let result = queue.enqueue(async { Ok(()) }).await;
        assert!(result.is_err());
    }
}

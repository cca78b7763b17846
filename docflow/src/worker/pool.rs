//! Groups of worker or indexer loops sharing one shutdown signal.

use std::future::Future;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::error;

use crate::errors::RunError;
use crate::lifecycle::ShutdownSignal;

/// A set of spawned loops.
///
/// When any loop fails the shared signal is fired so the others wind down.
#[derive(Debug)]
pub struct WorkerPool<E> {
    name: String,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<Result<(), E>>>,
}

impl<E> WorkerPool<E>
where
    E: std::fmt::Display + Send + 'static,
    RunError: From<E>,
{
    /// Creates an empty pool.
    pub fn new(name: impl Into<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            name: name.into(),
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawns one loop.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let name = self.name.clone();
        self.handles.push(tokio::spawn(async move {
            let result = task.await;
            if let Err(e) = &result {
                error!(pool = %name, error = %e, "Loop failed; shutting down pool");
                shutdown.terminate(format!("{name} failed: {e}"));
            }
            result
        }));
    }

    /// Number of spawned loops.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no loop was spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The signal shared by every loop.
    pub const fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Waits for every loop and returns the first failure.
    pub async fn join(self) -> Result<(), RunError> {
        let mut first = None;
        for outcome in join_all(self.handles).await {
            let result = match outcome {
                Ok(result) => result.map_err(RunError::from),
                Err(e) => Err(RunError::Join(e.to_string())),
            };
            if let Err(e) = result {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WorkerError;

    #[tokio::test]
    async fn test_failure_stops_siblings() {
        let shutdown = ShutdownSignal::new();
        let mut pool: WorkerPool<WorkerError> = WorkerPool::new("workers", shutdown.clone());

        let waiting = shutdown.clone();
        pool.spawn(async move {
            waiting.terminated().await;
            Ok(())
        });
        pool.spawn(async { Err(WorkerError::Config("broken".into())) });
        assert_eq!(pool.len(), 2);

        let err = pool.join().await.unwrap_err();
        assert!(matches!(err, RunError::Worker(WorkerError::Config(_))));
        assert!(shutdown.is_terminated());
    }

    #[tokio::test]
    async fn test_clean_exit() {
        let mut pool: WorkerPool<WorkerError> = WorkerPool::new("workers", ShutdownSignal::new());
        pool.spawn(async { Ok(()) });
        assert!(pool.join().await.is_ok());
    }
}

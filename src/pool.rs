//! Bounded worker pool for retrieval queries and index rebuilds.
//!
//! Each job runs on its own tokio task once it holds one of `size`
//! semaphore permits, so at most `size` jobs are in flight and the HTTP
//! handler awaiting the result never blocks the runtime.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently allowed to start without waiting.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs `job` once a permit is free and returns its result. A panicking
    /// job surfaces as an error.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            job.await
        });

        handle.await.context("worker task failed")?
    }
}

//! Bounded-concurrency worker pool with retry
//!
//! Fan-out runs up to `workers` tasks at once. Each task runs under a retry
//! loop with exponential backoff; only retryable errors (throttling,
//! timeouts, transport failures, 5xx) are retried. The result slice
//! preserves input order regardless of completion order, and a failed task
//! never cancels its siblings; only the run's cancellation token does.

use crate::config::ConcurrencyConfig;
use crate::error::{MigrateError, MigrateResult};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Invoked exactly once per task after terminal success or failure
pub type ProgressFn = Arc<dyn Fn() + Send + Sync>;

/// Worker pool configuration snapshot
#[derive(Debug, Clone)]
pub struct Pool {
    workers: usize,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl Pool {
    pub fn new(config: &ConcurrencyConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Number of retry attempts after the initial try
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Run `work` over all items with bounded concurrency
    ///
    /// Tasks receive a value copy of their item. The returned vector is
    /// indexed by input position: `None` for success, `Some(error)` for
    /// terminal failure.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        items: Vec<T>,
        work: F,
        progress: Option<ProgressFn>,
    ) -> Vec<Option<MigrateError>>
    where
        T: Clone + Send,
        F: Fn(T) -> Fut + Send + Sync + Clone,
        Fut: Future<Output = MigrateResult<()>> + Send,
    {
        let total = items.len();
        let mut results: Vec<Option<MigrateError>> = Vec::with_capacity(total);
        results.resize_with(total, || None);

        let mut completed = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let work = work.clone();
                let progress = progress.clone();
                async move {
                    let outcome = self.run_with_retry(cancel, item, work).await;
                    if let Some(progress) = progress {
                        progress();
                    }
                    (index, outcome)
                }
            })
            .buffer_unordered(self.workers);

        while let Some((index, outcome)) = completed.next().await {
            results[index] = outcome.err();
        }

        results
    }

    /// Run items one at a time in input order; used when consecutive items
    /// carry ordering constraints (e.g. versions of a single schema)
    pub async fn execute_sequential<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        items: Vec<T>,
        work: F,
    ) -> Vec<Option<MigrateError>>
    where
        T: Clone + Send,
        F: Fn(T) -> Fut + Send + Sync + Clone,
        Fut: Future<Output = MigrateResult<()>> + Send,
    {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            if cancel.is_cancelled() {
                results.push(Some(MigrateError::Cancelled));
                continue;
            }
            results.push(self.run_with_retry(cancel, item, work.clone()).await.err());
        }
        results
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        item: T,
        work: F,
    ) -> MigrateResult<()>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = MigrateResult<()>>,
    {
        let mut last_error: Option<MigrateError> = None;

        for attempt in 0..=self.retry_attempts {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            if attempt > 0 {
                let delay = self.retry_delay * 2u32.saturating_pow(attempt - 1);
                debug!(attempt, ?delay, "retrying after backoff");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match work(item.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.expect("retry loop records an error before exhausting attempts"))
    }
}

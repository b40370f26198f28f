//! Run context: worker pool, shared throttles and retry policy
//!
//! A [`RunContext`] is created once per command and cloned into every
//! worker. It replaces process-wide limiter globals, so tests can run
//! isolated contexts side by side.

mod executor;
mod retry;
mod throttle;

pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
pub use throttle::Throttle;

use crate::error::Result;
use crate::types::Backend;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default worker-pool width
pub const DEFAULT_PARALLELISM: usize = 10;

/// Default spacing between API calls to one provider
pub const DEFAULT_API_THROTTLE: Duration = Duration::from_millis(720);

/// Default spacing between merges
pub const DEFAULT_MERGE_THROTTLE: Duration = Duration::from_secs(30);

/// Knobs for building a [`RunContext`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// Maximum repos in flight
    pub parallelism: usize,
    /// Minimum spacing between API calls, per provider
    pub api_throttle: Duration,
    /// Minimum spacing between merges (load on CI)
    pub merge_throttle: Duration,
    /// Backoff for rate-limit errors
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            api_throttle: DEFAULT_API_THROTTLE,
            merge_throttle: DEFAULT_MERGE_THROTTLE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    parallelism: usize,
    slots: Arc<Semaphore>,
    github_api: Throttle,
    gitlab_api: Throttle,
    merges: Throttle,
    retry: RetryPolicy,
}

/// Shared execution context for one command invocation
#[derive(Debug, Clone)]
pub struct RunContext {
    inner: Arc<Inner>,
}

impl RunContext {
    /// Build a context. Must be called inside a tokio runtime.
    pub fn new(options: RunOptions) -> Self {
        let parallelism = options.parallelism.max(1);
        Self {
            inner: Arc::new(Inner {
                parallelism,
                slots: Arc::new(Semaphore::new(parallelism)),
                github_api: Throttle::new(options.api_throttle),
                gitlab_api: Throttle::new(options.api_throttle),
                merges: Throttle::new(options.merge_throttle),
                retry: options.retry,
            }),
        }
    }

    /// Context without throttling or retries
    pub fn unthrottled(parallelism: usize) -> Self {
        Self::new(RunOptions {
            parallelism,
            api_throttle: Duration::ZERO,
            merge_throttle: Duration::ZERO,
            retry: RetryPolicy::none(),
        })
    }

    /// Maximum repos in flight
    pub fn parallelism(&self) -> usize {
        self.inner.parallelism
    }

    pub(crate) fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.inner.slots)
    }

    fn api_throttle(&self, backend: Backend) -> &Throttle {
        match backend {
            Backend::GitHub => &self.inner.github_api,
            Backend::GitLab => &self.inner.gitlab_api,
        }
    }

    /// Make one remote call: wait on the backend's throttle, then run `op`,
    /// retrying rate-limit errors with backoff. Each retry waits on the
    /// throttle again.
    pub async fn call<T, F, Fut>(&self, backend: Backend, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let throttle = self.api_throttle(backend);
        self.inner
            .retry
            .run(what, || {
                let fut = op();
                async move {
                    throttle.tick().await;
                    fut.await
                }
            })
            .await
    }

    /// Wait for the merge throttle
    pub async fn merge_slot(&self) {
        self.inner.merges.tick().await;
    }
}

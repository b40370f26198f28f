//! Bounded fan-out of a per-repo operation
//!
//! Never fails fast: every repo runs to completion and failures are
//! aggregated afterwards, so one broken repo cannot stall a large batch.

use super::RunContext;
use crate::error::{Error, RepoFailure, Result};
use crate::types::Repo;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

impl RunContext {
    /// Run `op` for every repo with at most `parallelism` in flight.
    ///
    /// Each invocation holds a semaphore permit for its whole duration; the
    /// permit is released on return and on panic. Returns
    /// [`Error::Aggregate`] listing every failed repo, or `Ok(())`.
    pub async fn parallelize<F, Fut>(&self, repos: &[Repo], op: F) -> Result<()>
    where
        F: Fn(Repo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let op = Arc::new(op);
        let mut tasks = JoinSet::new();

        for repo in repos.iter().cloned() {
            let slots = self.slots();
            let op = Arc::clone(&op);
            tasks.spawn(async move {
                let name = repo.full_name();
                let result = match slots.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(repo = %name, "worker slot acquired");
                        match AssertUnwindSafe(op(repo)).catch_unwind().await {
                            Ok(result) => result,
                            Err(_) => Err(Error::Internal("worker panicked".to_string())),
                        }
                    }
                    Err(e) => Err(Error::Internal(format!("worker pool closed: {e}"))),
                };
                (name, result)
            });
        }

        let mut failures = Vec::new();
        let mut succeeded = 0_usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => succeeded += 1,
                Ok((repo, Err(e))) => failures.push(RepoFailure {
                    repo,
                    message: e.to_string(),
                }),
                Err(e) => failures.push(RepoFailure {
                    repo: "<unknown>".to_string(),
                    message: format!("worker task failed: {e}"),
                }),
            }
        }

        info!(succeeded, failed = failures.len(), "batch complete");

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by(|a, b| a.repo.cmp(&b.repo));
            Err(Error::Aggregate(failures))
        }
    }
}

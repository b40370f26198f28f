//! Merge execution - effectful operations
//!
//! Gathers facts lazily in check order, so a PR blocked on mergeability
//! never costs a status or review call, then performs the merge.

use crate::error::{Error, Result};
use crate::merge::plan::{
    Readiness, ReadinessOptions, check_build, check_pull_request, check_reviews,
};
use crate::platform::PlatformService;
use crate::runtime::RunContext;
use crate::types::{Backend, MergeMethod, PullRequest};
use tracing::{debug, info, warn};

/// Options for a merge run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Merge method
    pub method: MergeMethod,
    /// Gates to enforce
    pub readiness: ReadinessOptions,
}

/// Which PR to merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInput {
    /// PR number / MR iid
    pub number: u64,
    /// Commit whose build status gates the merge (empty: use the PR head)
    pub commit_sha: String,
}

/// Outcome of a merge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The PR is merged
    Merged {
        /// Merge commit SHA
        merge_commit_sha: String,
        /// It was merged before this run
        already_merged: bool,
    },
    /// A gate refused the merge
    Blocked(Readiness),
}

/// Fetch the PR and run the ordered readiness checks.
///
/// Stops fetching as soon as a check reaches a decision. `commit_sha`
/// selects the commit whose build status is checked; it falls back to the
/// PR head.
pub async fn check_readiness(
    ctx: &RunContext,
    platform: &dyn PlatformService,
    number: u64,
    commit_sha: Option<&str>,
    options: ReadinessOptions,
) -> Result<(PullRequest, Readiness)> {
    let backend = platform.backend();
    let pr = ctx
        .call(backend, "get pull request", || platform.get_pr(number))
        .await?;
    if let Some(decided) = check_pull_request(&pr) {
        return Ok((pr, decided));
    }

    if options.require_build_success {
        let sha = commit_sha
            .filter(|s| !s.is_empty())
            .unwrap_or(&pr.head_sha)
            .to_string();
        let status = ctx
            .call(backend, "commit status", || platform.commit_status(&sha))
            .await?;
        if let Some(decided) = check_build(&status) {
            return Ok((pr, decided));
        }
    }

    if options.require_review_approval {
        let review = ctx
            .call(backend, "review status", || platform.review_status(number))
            .await?;
        if let Some(decided) = check_reviews(review) {
            return Ok((pr, decided));
        }
    }

    Ok((pr, Readiness::Ready))
}

/// Merge one PR if every gate passes (EFFECTFUL)
///
/// An already-merged PR returns its historical merge SHA without any
/// mutating call. Blocked PRs are reported, never waited on.
pub async fn merge(
    ctx: &RunContext,
    platform: &dyn PlatformService,
    input: &MergeInput,
    options: MergeOptions,
) -> Result<MergeOutcome> {
    let (pr, readiness) = check_readiness(
        ctx,
        platform,
        input.number,
        Some(&input.commit_sha),
        options.readiness,
    )
    .await?;

    match readiness {
        Readiness::AlreadyMerged { merge_commit_sha } => {
            debug!(number = pr.number, "already merged");
            return Ok(MergeOutcome::Merged {
                merge_commit_sha,
                already_merged: true,
            });
        }
        Readiness::Ready => {}
        blocked => {
            debug!(number = pr.number, readiness = %blocked, "merge blocked");
            return Ok(MergeOutcome::Blocked(blocked));
        }
    }

    let backend = platform.backend();
    if backend == Backend::GitLab && pr.diverged_commits.unwrap_or(0) > 0 {
        info!(number = pr.number, diverged = ?pr.diverged_commits, "rebasing before merge");
        ctx.call(backend, "rebase", || platform.rebase_pr(pr.number))
            .await
            .map_err(|e| Error::GitLabApi(format!("failed to rebase onto {}: {e}", pr.base_ref)))?;
    }

    ctx.merge_slot().await;
    let result = ctx
        .call(backend, "merge", || platform.merge_pr(pr.number, options.method))
        .await?;
    if !result.merged {
        return Err(Error::Platform(format!(
            "failed to merge: {}",
            result.message.unwrap_or_else(|| "no reason given".to_string())
        )));
    }
    let merge_commit_sha = result.sha.unwrap_or_default();
    info!(number = pr.number, sha = %merge_commit_sha, method = %options.method, "merged");

    if backend == Backend::GitHub
        && let Err(e) = ctx
            .call(backend, "delete branch", || platform.delete_branch(&pr.head_ref))
            .await
    {
        warn!(branch = %pr.head_ref, error = %e, "merged but could not delete branch");
    }

    Ok(MergeOutcome::Merged {
        merge_commit_sha,
        already_merged: false,
    })
}

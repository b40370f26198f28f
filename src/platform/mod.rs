//! Platform services for GitHub and GitLab
//!
//! One trait contract, two concrete backends. Callers never branch on the
//! backend for I/O; the few semantic differences (labels, branch deletion,
//! rebasing) are expressed through [`PlatformService::backend`].

mod factory;
mod github;
mod github_checks;
mod gitlab;

pub use factory::{ApiPlatformFactory, create_platform_service, create_repo_search};
pub use github::{GitHubSearch, GitHubService};
pub use github_checks::{GitHubChecks, NO_CHECKS_STATE};
pub use gitlab::{GitLabSearch, GitLabService};

use crate::error::Result;
use crate::runtime::RunContext;
use crate::types::{
    Backend, CommitStatus, MergeMethod, MergeResult, NewPullRequest, PullRequest, Repo,
    ReviewStatus,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Platform service trait for PR/MR operations on one repository
///
/// Implementations perform exactly one remote call per method (except where
/// noted) and never retry; retries and throttling are applied by the caller
/// through [`RunContext::call`].
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Which backend this service talks to
    fn backend(&self) -> Backend;

    /// Default branch of the repository
    async fn default_branch(&self) -> Result<String>;

    /// Open a PR/MR.
    ///
    /// Fails with [`Error::PrAlreadyExists`](crate::error::Error::PrAlreadyExists)
    /// when one is already open for the same head and base.
    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest>;

    /// List open PRs/MRs whose head and base match
    async fn list_open_prs(&self, head: &str, base: &str) -> Result<Vec<PullRequest>>;

    /// Fetch one PR/MR
    async fn get_pr(&self, number: u64) -> Result<PullRequest>;

    /// Replace title and body
    async fn update_pr(&self, number: u64, title: &str, body: &str) -> Result<PullRequest>;

    /// Map a login to the user reference [`set_assignee`](Self::set_assignee)
    /// takes. GitHub assigns by login and answers without a remote call;
    /// GitLab looks up the numeric user id.
    async fn resolve_user(&self, login: &str) -> Result<String>;

    /// Assign the PR/MR to a user resolved by [`resolve_user`](Self::resolve_user)
    async fn set_assignee(&self, number: u64, user: &str) -> Result<()>;

    /// Add labels
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()>;

    /// Combined build status of a commit
    async fn commit_status(&self, sha: &str) -> Result<CommitStatus>;

    /// Review/approval state of a PR/MR
    async fn review_status(&self, number: u64) -> Result<ReviewStatus>;

    /// Rebase the source branch onto the target (GitLab)
    async fn rebase_pr(&self, number: u64) -> Result<()>;

    /// Merge with the given method
    async fn merge_pr(&self, number: u64, method: MergeMethod) -> Result<MergeResult>;

    /// Delete a remote branch
    async fn delete_branch(&self, branch: &str) -> Result<()>;
}

/// Repository discovery for the catalog
#[async_trait]
pub trait RepoSearch: Send + Sync {
    /// Find repos whose code matches `query`.
    ///
    /// Results may contain duplicates; the catalog deduplicates.
    async fn search_repos(&self, query: &str, ctx: &RunContext) -> Result<Vec<Repo>>;
}

/// Resolves the platform service for a repo
pub trait PlatformFactory: Send + Sync {
    /// Service bound to `repo`
    fn service_for(&self, repo: &Repo) -> Result<Arc<dyn PlatformService>>;
}

/// Remove `utm_*` tracking parameters from a URL.
///
/// The query string is dropped entirely when nothing else remains. Strings
/// that do not parse as URLs are returned unchanged.
pub fn strip_tracking_params(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return raw.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

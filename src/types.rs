//! Core types for fleet-pr

use serde::{Deserialize, Serialize};
use url::Url;

/// Hosting backend for a repo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GitHub or GitHub Enterprise
    GitHub,
    /// GitLab or self-hosted GitLab
    GitLab,
}

impl Backend {
    /// Default SaaS hostname for this backend
    pub const fn default_host(self) -> &'static str {
        match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::GitLab => write!(f, "GitLab"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(format!("unknown provider '{other}' (expected github or gitlab)")),
        }
    }
}

/// Parameters that define which provider hosts a repo
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend type
    pub backend: Backend,
    /// Base URL of a self-hosted/enterprise instance (None for SaaS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
}

impl ProviderConfig {
    /// Provider config for the public SaaS instance of `backend`
    pub const fn saas(backend: Backend) -> Self {
        Self {
            backend,
            backend_url: None,
        }
    }

    /// Whether this points at a self-hosted/enterprise instance
    pub fn is_enterprise(&self) -> bool {
        self.backend_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Hostname used for SSH clone URLs
    pub fn host(&self) -> String {
        self.backend_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .and_then(|u| Url::parse(u).ok())
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| self.backend.default_host().to_string())
    }
}

/// A repository targeted by the run
///
/// Equality is full-struct, clone URL included: two catalog entries that
/// differ only in clone URL stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repo {
    /// Repository name
    pub name: String,
    /// Owner (user, organization or GitLab namespace path)
    pub owner: String,
    /// Clone URL captured during search (may be empty)
    #[serde(default)]
    pub clone_url: String,
    /// Hosting provider
    pub provider: ProviderConfig,
}

impl Repo {
    /// Create a repo on the given provider
    pub fn new(owner: &str, name: &str, clone_url: &str, provider: ProviderConfig) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            clone_url: clone_url.to_string(),
            provider,
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Whether the repo lives on GitHub
    pub fn is_github(&self) -> bool {
        self.provider.backend == Backend::GitHub
    }

    /// Whether the repo lives on GitLab
    pub fn is_gitlab(&self) -> bool {
        self.provider.backend == Backend::GitLab
    }

    /// Whether the repo lives on a self-hosted/enterprise instance
    pub fn is_enterprise(&self) -> bool {
        self.provider.is_enterprise()
    }

    /// Clone URL, guessing an SSH URL when none was captured
    pub fn clone_url_or_guess(&self) -> String {
        if self.clone_url.is_empty() {
            format!("git@{}:{}/{}", self.provider.host(), self.owner, self.name)
        } else {
            self.clone_url.clone()
        }
    }
}

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// PR is open
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Live view of a pull request / merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number (GitLab: MR iid)
    pub number: u64,
    /// Web URL for the PR/MR
    pub html_url: String,
    /// Title
    pub title: String,
    /// Body/description
    pub body: Option<String>,
    /// Head (source) branch
    pub head_ref: String,
    /// Base (target) branch
    pub base_ref: String,
    /// SHA of the head commit
    pub head_sha: String,
    /// Current state
    pub state: PrState,
    /// Whether the provider considers it mergeable
    /// (`None` while GitHub is still computing)
    pub mergeable: Option<bool>,
    /// Merge commit SHA once merged
    pub merge_commit_sha: Option<String>,
    /// Login/username of the assignee
    pub assignee: Option<String>,
    /// Label names
    pub labels: Vec<String>,
    /// Whether the PR is a draft
    pub is_draft: bool,
    /// Commits on the target branch missing from the source (GitLab only)
    pub diverged_commits: Option<u64>,
}

impl PullRequest {
    /// Whether the PR was merged
    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }
}

/// Parameters for opening a PR/MR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    /// Head (source) branch
    pub head: String,
    /// Base (target) branch
    pub base: String,
    /// Title
    pub title: String,
    /// Body/description
    pub body: String,
    /// Open as draft
    pub draft: bool,
}

/// Title prefix GitLab uses to mark a merge request as draft
pub const GITLAB_DRAFT_PREFIX: &str = "Draft: ";

impl NewPullRequest {
    /// Title as `backend` stores it.
    ///
    /// GitLab has no draft flag on create; a draft MR is one whose title
    /// starts with `Draft:`.
    pub fn title_for(&self, backend: Backend) -> String {
        let marked = self
            .title
            .get(..6)
            .is_some_and(|start| start.eq_ignore_ascii_case("draft:"));
        if backend == Backend::GitLab && self.draft && !marked {
            format!("{GITLAB_DRAFT_PREFIX}{}", self.title)
        } else {
            self.title.clone()
        }
    }
}

/// Combined build status of a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    /// Lowercase combined state ("success", "pending", "failure", ...)
    pub state: String,
    /// CI build URL, tracking parameters stripped
    pub build_url: Option<String>,
}

impl CommitStatus {
    /// Whether every reported check succeeded
    pub fn is_success(&self) -> bool {
        self.state == "success"
    }

    /// Whether builds are still running
    pub fn is_pending(&self) -> bool {
        matches!(
            self.state.as_str(),
            "pending"
                | "expected"
                | "running"
                | "created"
                | "waiting_for_resource"
                | "preparing"
                | "scheduled"
        )
    }
}

/// Normalized review outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    /// Approval requirements are met
    Approved,
    /// No (or not enough) reviews yet
    Awaiting,
    /// At least one review is not an approval
    Rejected,
}

/// Result of a merge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Create a merge commit
    #[default]
    Merge,
    /// Squash all commits into one
    Squash,
    /// Rebase commits onto base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

impl std::str::FromStr for MergeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            "rebase" => Ok(Self::Rebase),
            other => Err(format!(
                "invalid merge method '{other}'; possible values: merge, squash, rebase"
            )),
        }
    }
}

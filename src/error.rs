//! Error types for fleet-pr

use crate::types::Backend;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// A single repo's failure inside an aggregated batch error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFailure {
    /// `owner/name` of the failing repo
    pub repo: String,
    /// Rendered error message
    pub message: String,
}

/// Errors produced by fleet-pr
#[derive(Debug, Error)]
pub enum Error {
    /// GitHub API returned an error
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitLab API returned an error
    #[error("GitLab API error: {0}")]
    GitLabApi(String),

    /// Provider signalled rate limiting or abuse detection (retryable)
    #[error("rate limited by {backend}: {message}")]
    RateLimited {
        /// Backend that throttled us
        backend: Backend,
        /// Provider message
        message: String,
    },

    /// Creating a PR/MR failed because one already exists for head+base
    #[error("pull request already exists: {0}")]
    PrAlreadyExists(String),

    /// Lookup by head+base did not yield exactly one open PR/MR
    #[error("expected exactly one open pull request for {head} -> {base}, found {count}")]
    AmbiguousPullRequest {
        /// Head branch
        head: String,
        /// Base branch
        base: String,
        /// Number of open PRs found
        count: usize,
    },

    /// A merge gate refused the merge (`<reason>: <explanation>`)
    #[error("{0}")]
    MergeBlocked(String),

    /// Generic platform failure (used by fakes and unsupported operations)
    #[error("platform error: {0}")]
    Platform(String),

    /// No usable credentials for a backend
    #[error("authentication error: {0}")]
    Auth(String),

    /// Reading or writing a stage artifact failed
    #[error("artifact error: {0}")]
    Artifact(String),

    /// The workdir was created by a different tool version
    #[error(
        "workdir {workdir} was created with version {found}, which is incompatible with {current}; \
         re-run with a compatible version or remove the workdir"
    )]
    IncompatibleWorkdir {
        /// Workdir path
        workdir: String,
        /// Version recorded in `init.json`
        found: String,
        /// Version of this binary
        current: String,
    },

    /// A git or shell collaborator failed
    #[error("git error: {0}")]
    Git(String),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// `--repo` named a repo that is not in the catalog
    #[error("{0} is not a targeted repo name")]
    UnknownRepo(String),

    /// One or more repos failed during a batch
    #[error("{}", render_failures(.0))]
    Aggregate(Vec<RepoFailure>),

    /// Internal invariant failure
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error belongs to the provider's rate-limit/abuse class
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Failures contained in an aggregate error (empty for other variants)
    pub fn failures(&self) -> &[RepoFailure] {
        match self {
            Self::Aggregate(failures) => failures,
            _ => &[],
        }
    }
}

fn render_failures(failures: &[RepoFailure]) -> String {
    let mut out = format!("{} repo(s) failed", failures.len());
    for failure in failures {
        out.push_str(&format!("\n  {}: {}", failure.repo, failure.message));
    }
    out
}

/// Whether a provider message describes rate limiting or abuse detection
pub(crate) fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("abuse")
}

impl From<octocrab::Error> for Error {
    fn from(err: octocrab::Error) -> Self {
        if let octocrab::Error::GitHub { source, .. } = &err {
            let status = source.status_code.as_u16();
            let detail = format!("{} {:?}", source.message, source.errors);

            if status == 429 || (status == 403 && mentions_rate_limit(&detail)) {
                return Self::RateLimited {
                    backend: Backend::GitHub,
                    message: source.message.clone(),
                };
            }
            if status == 422 && detail.contains("already exists") {
                return Self::PrAlreadyExists(detail);
            }
            return Self::GitHubApi(format!("{} ({status})", source.message));
        }
        Self::GitHubApi(err.to_string())
    }
}

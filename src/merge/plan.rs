//! Merge readiness - pure decision functions
//!
//! No I/O happens here. Facts about a PR are fetched by
//! [`check_readiness`](crate::merge::check_readiness) and fed through these
//! checks in a fixed order; the first check that reaches a decision wins.

use crate::types::{CommitStatus, PrState, PullRequest, ReviewStatus};

/// Which gates must pass before merging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    /// Combined build status must be `success`
    pub require_build_success: bool,
    /// Reviews must approve
    pub require_review_approval: bool,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            require_build_success: true,
            require_review_approval: true,
        }
    }
}

/// Where a PR stands relative to merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Merged already; nothing to do
    AlreadyMerged {
        /// Historical merge commit
        merge_commit_sha: String,
    },
    /// Conflicts, closed, or mergeability not yet computed
    NotMergeable,
    /// Build finished in a non-success state
    BuildFailed {
        /// Reported combined state
        state: String,
    },
    /// Build still running
    BuildPending,
    /// No (or not enough) approvals yet
    AwaitingReview,
    /// A reviewer did not approve
    RejectedReview,
    /// Every required gate passed
    Ready,
}

impl Readiness {
    /// Status vocabulary used by `status`/`sync`
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyMerged { .. } => "already-merged",
            Self::NotMergeable => "not-mergeable",
            Self::BuildFailed { .. } => "build-failed",
            Self::BuildPending => "build-pending",
            Self::AwaitingReview => "awaiting-review",
            Self::RejectedReview => "rejected-review",
            Self::Ready => "ready-to-merge",
        }
    }

    /// Reason a merge was refused, in merge vocabulary (`None` when not blocked)
    pub const fn block_reason(&self) -> Option<&'static str> {
        match self {
            Self::NotMergeable => Some("not-mergeable"),
            Self::BuildFailed { .. } => Some("failed-build"),
            Self::BuildPending => Some("build-pending"),
            Self::AwaitingReview => Some("awaiting-review"),
            Self::RejectedReview => Some("rejected-review"),
            Self::AlreadyMerged { .. } | Self::Ready => None,
        }
    }

    /// Whether this readiness refuses a merge
    pub const fn is_blocked(&self) -> bool {
        self.block_reason().is_some()
    }

    /// Human-readable explanation
    pub fn explanation(&self) -> String {
        match self {
            Self::AlreadyMerged { merge_commit_sha } => {
                format!("already merged as {merge_commit_sha}")
            }
            Self::NotMergeable => "pull request is not mergeable".to_string(),
            Self::BuildFailed { state } => {
                format!("status was not 'success', instead was '{state}'")
            }
            Self::BuildPending => "build is still running".to_string(),
            Self::AwaitingReview => "pull request has not been approved".to_string(),
            Self::RejectedReview => "pull request was not approved by every reviewer".to_string(),
            Self::Ready => "ready to merge".to_string(),
        }
    }

    /// `"<reason>: <explanation>"`, persisted as a blocked merge's error text
    pub fn block_message(&self) -> Option<String> {
        self.block_reason()
            .map(|reason| format!("{reason}: {}", self.explanation()))
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks (a) and (b): merged state and mergeability
pub fn check_pull_request(pr: &PullRequest) -> Option<Readiness> {
    if pr.is_merged() {
        return Some(Readiness::AlreadyMerged {
            merge_commit_sha: pr.merge_commit_sha.clone().unwrap_or_default(),
        });
    }
    if pr.state == PrState::Closed || pr.mergeable != Some(true) {
        return Some(Readiness::NotMergeable);
    }
    None
}

/// Check (c): combined build status
pub fn check_build(status: &CommitStatus) -> Option<Readiness> {
    if status.is_success() {
        None
    } else if status.is_pending() {
        Some(Readiness::BuildPending)
    } else {
        Some(Readiness::BuildFailed {
            state: status.state.clone(),
        })
    }
}

/// Check (d): reviews
pub const fn check_reviews(review: ReviewStatus) -> Option<Readiness> {
    match review {
        ReviewStatus::Approved => None,
        ReviewStatus::Awaiting => Some(Readiness::AwaitingReview),
        ReviewStatus::Rejected => Some(Readiness::RejectedReview),
    }
}

/// Run every check in order over already-gathered facts (PURE)
///
/// `build` and `review` are only consulted when the options require them;
/// a required fact that is missing counts as not passing.
pub fn assess(
    pr: &PullRequest,
    build: Option<&CommitStatus>,
    review: Option<ReviewStatus>,
    options: ReadinessOptions,
) -> Readiness {
    if let Some(decided) = check_pull_request(pr) {
        return decided;
    }
    if options.require_build_success {
        let decided = match build {
            Some(status) => check_build(status),
            None => Some(Readiness::BuildPending),
        };
        if let Some(decided) = decided {
            return decided;
        }
    }
    if options.require_review_approval
        && let Some(decided) = check_reviews(review.unwrap_or(ReviewStatus::Awaiting))
    {
        return decided;
    }
    Readiness::Ready
}

//! Push stage: force-push the planned commit and reconcile its PR/MR
//!
//! The PR title comes from the first line of the commit message and the
//! body from the rest. Re-pushing the same branch converges on the same
//! PR instead of opening a new one.

mod reconcile;

pub use reconcile::reconcile_pull_request;

use crate::artifact::PullRequestRecord;
use crate::error::Result;
use crate::git::GitCollaborator;
use crate::platform::PlatformService;
use crate::runtime::RunContext;
use crate::types::{Backend, NewPullRequest};
use std::path::PathBuf;
use tracing::{debug, info};

/// Everything needed to push one planned repo
#[derive(Debug, Clone, Default)]
pub struct PushInput {
    /// Directory holding the planned commit
    pub plan_dir: PathBuf,
    /// Feature branch to push to
    pub branch_name: String,
    /// Commit message (first line becomes the title)
    pub commit_message: String,
    /// Body to use instead of the commit message remainder
    pub body_override: Option<String>,
    /// User to assign
    pub assignee: Option<String>,
    /// Labels to add (GitHub only)
    pub labels: Vec<String>,
    /// Open as draft
    pub draft: bool,
}

/// Split a commit message into PR title and body.
///
/// The title is the first line; the body is the remainder, trimmed.
pub fn split_commit_message(message: &str) -> (String, String) {
    let message = message.trim_start();
    match message.split_once('\n') {
        Some((title, rest)) => (title.trim_end().to_string(), rest.trim().to_string()),
        None => (message.trim_end().to_string(), String::new()),
    }
}

/// Force-push the planned branch and converge on exactly one open PR/MR.
///
/// Returns the record persisted as the push artifact.
pub async fn push(
    ctx: &RunContext,
    git: &dyn GitCollaborator,
    platform: &dyn PlatformService,
    input: &PushInput,
) -> Result<PullRequestRecord> {
    let commit_sha = git.force_push(&input.plan_dir, &input.branch_name).await?;
    debug!(branch = %input.branch_name, sha = %commit_sha, "pushed branch");

    let backend = platform.backend();
    let base = ctx
        .call(backend, "default branch", || platform.default_branch())
        .await?;

    let (title, body) = split_commit_message(&input.commit_message);
    let new = NewPullRequest {
        head: input.branch_name.clone(),
        base,
        title,
        body: input.body_override.clone().unwrap_or(body),
        draft: input.draft,
    };

    let pr = reconcile_pull_request(ctx, platform, &new).await?;

    let mut assignee = pr.assignee.clone();
    if let Some(login) = input.assignee.as_deref()
        && assignee.as_deref() != Some(login)
    {
        let user = ctx
            .call(backend, "find user", || platform.resolve_user(login))
            .await?;
        ctx.call(backend, "set assignee", || {
            platform.set_assignee(pr.number, &user)
        })
        .await?;
        assignee = Some(login.to_string());
    }

    if backend == Backend::GitHub {
        let missing: Vec<String> = input
            .labels
            .iter()
            .filter(|label| !pr.labels.contains(label))
            .cloned()
            .collect();
        if !missing.is_empty() {
            ctx.call(backend, "add labels", || platform.add_labels(pr.number, &missing))
                .await?;
        }
    }

    let status = ctx
        .call(backend, "commit status", || platform.commit_status(&commit_sha))
        .await?;

    info!(number = pr.number, status = %status.state, "push reconciled");
    Ok(PullRequestRecord {
        commit_sha,
        url: pr.html_url,
        number: pr.number,
        combined_status: status.state,
        assignee: assignee.unwrap_or_default(),
        build_url: status.build_url.unwrap_or_default(),
        readiness: String::new(),
    })
}

//! Converge on exactly one open PR/MR per (head, base)

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::runtime::RunContext;
use crate::types::{NewPullRequest, PullRequest};
use tracing::{debug, info};

/// Whether two PR bodies differ, ignoring surrounding whitespace and CRLF
fn body_differs(current: Option<&str>, wanted: &str) -> bool {
    let normalize = |s: &str| s.replace("\r\n", "\n").trim().to_string();
    normalize(current.unwrap_or_default()) != normalize(wanted)
}

/// Open the PR/MR described by `new`, or adopt the one already open.
///
/// When the provider reports that one exists, the open PRs for the same
/// head and base are listed and exactly one must match. Its title and body
/// are edited to match `new` when they differ. GitLab drafts are compared
/// with their `Draft: ` prefix. Running this twice yields the same PR and no
/// further edits.
pub async fn reconcile_pull_request(
    ctx: &RunContext,
    platform: &dyn PlatformService,
    new: &NewPullRequest,
) -> Result<PullRequest> {
    let backend = platform.backend();
    match ctx
        .call(backend, "create pull request", || platform.create_pr(new))
        .await
    {
        Ok(pr) => {
            info!(number = pr.number, url = %pr.html_url, "opened pull request");
            return Ok(pr);
        }
        Err(Error::PrAlreadyExists(detail)) => {
            debug!(head = %new.head, base = %new.base, %detail, "pull request already exists");
        }
        Err(e) => return Err(e),
    }

    let mut existing = ctx
        .call(backend, "list pull requests", || {
            platform.list_open_prs(&new.head, &new.base)
        })
        .await?;
    if existing.len() != 1 {
        return Err(Error::AmbiguousPullRequest {
            head: new.head.clone(),
            base: new.base.clone(),
            count: existing.len(),
        });
    }
    let pr = existing.remove(0);

    let title = new.title_for(backend);
    if pr.title != title || body_differs(pr.body.as_deref(), &new.body) {
        debug!(number = pr.number, "updating title/body of existing pull request");
        return ctx
            .call(backend, "update pull request", || {
                platform.update_pr(pr.number, &title, &new.body)
            })
            .await;
    }

    debug!(number = pr.number, "existing pull request is up to date");
    Ok(pr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_comparison_ignores_line_endings() {
        assert!(!body_differs(Some("a\r\nb\r\n"), "a\nb"));
        assert!(!body_differs(None, ""));
        assert!(body_differs(None, "text"));
        assert!(body_differs(Some("old"), "new"));
    }
}

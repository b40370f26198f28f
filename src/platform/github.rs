//! GitHub platform service implementation

use crate::error::{Error, Result, mentions_rate_limit};
use crate::platform::{GitHubChecks, PlatformService, RepoSearch};
use crate::runtime::RunContext;
use crate::types::{
    Backend, CommitStatus, MergeMethod, MergeResult, NewPullRequest, PrState, ProviderConfig,
    PullRequest, Repo, ReviewStatus,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use octocrab::models::pulls::ReviewState;
use octocrab::params::repos::Reference;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

const SAAS_API_BASE: &str = "https://api.github.com";

/// Code search returns at most 1000 results
const SEARCH_PAGE_SIZE: u32 = 100;
const SEARCH_MAX_PAGES: u32 = 10;

/// REST base for a GitHub instance (`{backend_url}/api/v3` on Enterprise)
fn api_base(backend_url: Option<&str>) -> String {
    match backend_url.filter(|u| !u.is_empty()) {
        Some(url) => format!("{}/api/v3", url.trim_end_matches('/')),
        None => SAAS_API_BASE.to_string(),
    }
}

fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent("fleet-pr")
        .build()
        .map_err(|e| Error::GitHubApi(format!("failed to create HTTP client: {e}")))
}

/// Map a raw REST response to our error taxonomy
pub(super) async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && mentions_rate_limit(&body))
    {
        return Err(Error::RateLimited {
            backend: Backend::GitHub,
            message: format!("{what}: {status}"),
        });
    }
    Err(Error::GitHubApi(format!("{what} failed ({status}): {body}")))
}

/// Classify GitHub review states.
///
/// No reviews means awaiting; every review must be an approval.
pub fn review_status_from_states(states: &[String]) -> ReviewStatus {
    if states.is_empty() {
        return ReviewStatus::Awaiting;
    }
    if states.iter().all(|s| s == "APPROVED") {
        ReviewStatus::Approved
    } else {
        ReviewStatus::Rejected
    }
}

fn review_state_name(state: Option<&ReviewState>) -> String {
    match state {
        Some(ReviewState::Approved) => "APPROVED",
        Some(ReviewState::ChangesRequested) => "CHANGES_REQUESTED",
        Some(ReviewState::Commented) => "COMMENTED",
        Some(ReviewState::Dismissed) => "DISMISSED",
        _ => "PENDING",
    }
    .to_string()
}

/// GitHub service for one repository, using octocrab plus raw REST calls
pub struct GitHubService {
    client: Octocrab,
    checks: GitHubChecks,
    owner: String,
    repo: String,
}

impl GitHubService {
    /// Create a service bound to `owner/repo`.
    ///
    /// `backend_url` selects a GitHub Enterprise instance.
    pub fn new(token: &str, owner: &str, repo: &str, backend_url: Option<&str>) -> Result<Self> {
        let api_base = api_base(backend_url);
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if api_base != SAAS_API_BASE {
            builder = builder
                .base_uri(&api_base)
                .map_err(|e| Error::GitHubApi(e.to_string()))?;
        }
        let client = builder
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        Ok(Self {
            client,
            checks: GitHubChecks::new(http_client()?, token, backend_url),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

/// Helper to convert octocrab PR to our `PullRequest` type
fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    let state = match pr.state {
        Some(octocrab::models::IssueState::Open) => PrState::Open,
        _ if pr.merged_at.is_some() => PrState::Merged,
        // IssueState is non-exhaustive
        Some(_) | None => PrState::Closed,
    };

    PullRequest {
        number: pr.number,
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone(),
        head_ref: pr.head.ref_field.clone(),
        base_ref: pr.base.ref_field.clone(),
        head_sha: pr.head.sha.clone(),
        state,
        mergeable: pr.mergeable,
        merge_commit_sha: pr.merge_commit_sha.clone(),
        assignee: pr.assignee.as_ref().map(|a| a.login.clone()),
        labels: pr
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
        is_draft: pr.draft.unwrap_or(false),
        diverged_commits: None,
    }
}

#[async_trait]
impl PlatformService for GitHubService {
    fn backend(&self) -> Backend {
        Backend::GitHub
    }

    async fn default_branch(&self) -> Result<String> {
        let repo = self.client.repos(&self.owner, &self.repo).get().await?;
        repo.default_branch.ok_or_else(|| {
            Error::GitHubApi(format!("{}/{} has no default branch", self.owner, self.repo))
        })
    }

    async fn create_pr(&self, new: &NewPullRequest) -> Result<PullRequest> {
        debug!(head = %new.head, base = %new.base, draft = new.draft, "creating PR");
        let pr = self
            .client
            .pulls(&self.owner, &self.repo)
            .create(&new.title, &new.head, &new.base)
            .body(&new.body)
            .draft(new.draft)
            .send()
            .await?;

        let result = pr_from_octocrab(&pr);
        debug!(pr_number = result.number, "created PR");
        Ok(result)
    }

    async fn list_open_prs(&self, head: &str, base: &str) -> Result<Vec<PullRequest>> {
        debug!(head, base, "listing open PRs");
        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .list()
            .head(format!("{}:{head}", self.owner))
            .base(base)
            .state(octocrab::params::State::Open)
            .send()
            .await?;

        let prs: Vec<PullRequest> = page
            .items
            .iter()
            .map(pr_from_octocrab)
            .filter(|pr| pr.head_ref == head && pr.base_ref == base)
            .collect();
        debug!(count = prs.len(), "listed open PRs");
        Ok(prs)
    }

    async fn get_pr(&self, number: u64) -> Result<PullRequest> {
        let pr = self.client.pulls(&self.owner, &self.repo).get(number).await?;
        let result = pr_from_octocrab(&pr);
        debug!(pr_number = number, state = %result.state, "got PR");
        Ok(result)
    }

    async fn update_pr(&self, number: u64, title: &str, body: &str) -> Result<PullRequest> {
        debug!(pr_number = number, "updating PR title/body");
        let pr = self
            .client
            .pulls(&self.owner, &self.repo)
            .update(number)
            .title(title)
            .body(body)
            .send()
            .await?;
        Ok(pr_from_octocrab(&pr))
    }

    async fn resolve_user(&self, login: &str) -> Result<String> {
        Ok(login.to_string())
    }

    async fn set_assignee(&self, number: u64, user: &str) -> Result<()> {
        debug!(pr_number = number, login = user, "assigning PR");
        self.client
            .issues(&self.owner, &self.repo)
            .add_assignees(number, &[user])
            .await?;
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        debug!(pr_number = number, ?labels, "labelling PR");
        self.client
            .issues(&self.owner, &self.repo)
            .add_labels(number, labels)
            .await?;
        Ok(())
    }

    async fn commit_status(&self, sha: &str) -> Result<CommitStatus> {
        self.checks.commit_status(&self.owner, &self.repo, sha).await
    }

    async fn review_status(&self, number: u64) -> Result<ReviewStatus> {
        let reviews = self
            .client
            .pulls(&self.owner, &self.repo)
            .list_reviews(number)
            .send()
            .await?;

        let states: Vec<String> = reviews
            .items
            .iter()
            .map(|r| review_state_name(r.state.as_ref()))
            .collect();
        let status = review_status_from_states(&states);
        debug!(pr_number = number, reviews = states.len(), ?status, "review status");
        Ok(status)
    }

    async fn rebase_pr(&self, number: u64) -> Result<()> {
        debug!(pr_number = number, "rebase not needed on GitHub");
        Ok(())
    }

    async fn merge_pr(&self, number: u64, method: MergeMethod) -> Result<MergeResult> {
        debug!(pr_number = number, %method, "merging PR");

        let octocrab_method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let result = self
            .client
            .pulls(&self.owner, &self.repo)
            .merge(number)
            .method(octocrab_method)
            .send()
            .await?;

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number = number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting remote branch");
        self.client
            .repos(&self.owner, &self.repo)
            .delete_ref(&Reference::Branch(branch.to_string()))
            .await?;
        Ok(())
    }
}

/// GitHub code search for the catalog
pub struct GitHubSearch {
    http: Client,
    token: String,
    api_base: String,
    provider: ProviderConfig,
}

impl GitHubSearch {
    /// Search on GitHub.com, or on an Enterprise instance when
    /// `backend_url` is set
    pub fn new(token: &str, backend_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            token: token.to_string(),
            api_base: api_base(backend_url),
            provider: ProviderConfig {
                backend: Backend::GitHub,
                backend_url: backend_url.filter(|u| !u.is_empty()).map(ToString::to_string),
            },
        })
    }

    async fn search_page(&self, query: &str, page: u32) -> Result<CodeSearchPage> {
        let url = format!("{}/search/code", self.api_base);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", query.to_string()),
                ("per_page", SEARCH_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        Ok(check_response(response, "code search").await?.json().await?)
    }
}

#[derive(Deserialize)]
struct CodeSearchPage {
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<CodeSearchItem>,
}

#[derive(Deserialize)]
struct CodeSearchItem {
    repository: SearchRepository,
}

#[derive(Deserialize)]
struct SearchRepository {
    name: String,
    full_name: String,
    owner: SearchOwner,
}

#[derive(Deserialize)]
struct SearchOwner {
    login: String,
}

#[async_trait]
impl RepoSearch for GitHubSearch {
    async fn search_repos(&self, query: &str, ctx: &RunContext) -> Result<Vec<Repo>> {
        let host = self.provider.host();
        let mut seen = HashSet::new();
        let mut repos = Vec::new();

        for page in 1..=SEARCH_MAX_PAGES {
            let result = ctx
                .call(Backend::GitHub, "code search", || self.search_page(query, page))
                .await?;
            if result.incomplete_results {
                return Err(Error::GitHubApi(
                    "GitHub API timed out before completing the search".to_string(),
                ));
            }

            let count = result.items.len();
            for item in result.items {
                let r = item.repository;
                if seen.insert(r.full_name.clone()) {
                    repos.push(Repo::new(
                        &r.owner.login,
                        &r.name,
                        &format!("git@{host}:{}", r.full_name),
                        self.provider.clone(),
                    ));
                }
            }
            debug!(page, count, total = repos.len(), "code search page");

            if count < SEARCH_PAGE_SIZE as usize {
                break;
            }
        }

        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_for_enterprise() {
        assert_eq!(api_base(None), "https://api.github.com");
        assert_eq!(api_base(Some("")), "https://api.github.com");
        assert_eq!(
            api_base(Some("https://ghe.corp.example/")),
            "https://ghe.corp.example/api/v3"
        );
    }

    #[test]
    fn test_review_states() {
        let states = |s: &[&str]| s.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert_eq!(review_status_from_states(&[]), ReviewStatus::Awaiting);
        assert_eq!(
            review_status_from_states(&states(&["APPROVED", "APPROVED"])),
            ReviewStatus::Approved
        );
        assert_eq!(
            review_status_from_states(&states(&["APPROVED", "CHANGES_REQUESTED"])),
            ReviewStatus::Rejected
        );
        // A bare comment is not an approval
        assert_eq!(
            review_status_from_states(&states(&["COMMENTED"])),
            ReviewStatus::Rejected
        );
    }
}

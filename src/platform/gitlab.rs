//! GitLab platform service implementation

use crate::error::{Error, Result, mentions_rate_limit};
use crate::platform::{PlatformService, RepoSearch, strip_tracking_params};
use crate::runtime::RunContext;
use crate::types::{
    Backend, CommitStatus, MergeMethod, MergeResult, NewPullRequest, PrState, ProviderConfig,
    PullRequest, Repo, ReviewStatus,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SAAS_BASE_URL: &str = "https://gitlab.com";

const SEARCH_PAGE_SIZE: usize = 100;
const SEARCH_MAX_PAGES: usize = 10;

/// Commit state reported when no pipeline ran for a commit
pub const NO_PIPELINE_STATE: &str = "none";

fn base_url(backend_url: Option<&str>) -> String {
    backend_url
        .filter(|u| !u.is_empty())
        .unwrap_or(SAAS_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::GitLabApi(format!("failed to create HTTP client: {e}")))
}

/// Send a request and map failures to our error taxonomy
async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    check(request.send().await?, what).await
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && mentions_rate_limit(&body))
    {
        return Err(Error::RateLimited {
            backend: Backend::GitLab,
            message: format!("{what}: {status}"),
        });
    }
    Err(Error::GitLabApi(format!("{what} failed ({status}): {body}")))
}

/// Classify GitLab approvals against the required threshold
pub const fn approval_status(given: usize, required: usize) -> ReviewStatus {
    if given >= required {
        ReviewStatus::Approved
    } else {
        ReviewStatus::Awaiting
    }
}

#[derive(Deserialize)]
struct User {
    id: u64,
    username: String,
}

#[derive(Deserialize)]
struct MergeRequest {
    iid: u64,
    web_url: String,
    title: String,
    description: Option<String>,
    source_branch: String,
    target_branch: String,
    sha: Option<String>,
    state: String, // "opened", "closed", "merged", "locked"
    merge_status: Option<String>,
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
    assignee: Option<User>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    draft: bool,
    diverged_commits_count: Option<u64>,
}

impl From<MergeRequest> for PullRequest {
    fn from(mr: MergeRequest) -> Self {
        let state = match mr.state.as_str() {
            "opened" | "locked" => PrState::Open,
            "merged" => PrState::Merged,
            _ => PrState::Closed,
        };
        Self {
            number: mr.iid,
            html_url: mr.web_url,
            title: mr.title,
            body: mr.description,
            head_ref: mr.source_branch,
            base_ref: mr.target_branch,
            head_sha: mr.sha.unwrap_or_default(),
            state,
            mergeable: mr.merge_status.as_deref().map(|s| s == "can_be_merged"),
            merge_commit_sha: mr.merge_commit_sha.or(mr.squash_commit_sha),
            assignee: mr.assignee.map(|u| u.username),
            labels: mr.labels,
            is_draft: mr.draft,
            diverged_commits: mr.diverged_commits_count,
        }
    }
}

#[derive(Serialize)]
struct CreateMrPayload<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
struct Pipeline {
    status: String, // "success", "failed", "running", "pending", ...
    web_url: Option<String>,
}

#[derive(Deserialize)]
struct Approvals {
    #[serde(default)]
    approvals_required: usize,
    #[serde(default)]
    approved_by: Vec<serde_json::Value>,
}

/// GitLab service for one project, using reqwest against REST v4
pub struct GitLabService {
    client: Client,
    token: String,
    base_url: String,
    project_path: String,
}

impl GitLabService {
    /// Create a service bound to `owner/repo` (owner may be a nested group path).
    ///
    /// `backend_url` selects a self-hosted instance.
    pub fn new(token: &str, owner: &str, repo: &str, backend_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            token: token.to_string(),
            base_url: base_url(backend_url),
            project_path: format!("{owner}/{repo}"),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    fn project_url(&self, path: &str) -> String {
        let project = urlencoding::encode(&self.project_path);
        self.api_url(&format!("/projects/{project}{path}"))
    }

    fn mr_url(&self, iid: u64, path: &str) -> String {
        self.project_url(&format!("/merge_requests/{iid}{path}"))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).header("PRIVATE-TOKEN", &self.token)
    }

    fn put(&self, url: &str) -> RequestBuilder {
        self.client.put(url).header("PRIVATE-TOKEN", &self.token)
    }
}

#[async_trait]
impl PlatformService for GitLabService {
    fn backend(&self) -> Backend {
        Backend::GitLab
    }

    async fn default_branch(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Project {
            default_branch: Option<String>,
        }

        let project: Project = send(self.get(&self.project_url("")), "get project")
            .await?
            .json()
            .await?;
        project
            .default_branch
            .ok_or_else(|| Error::GitLabApi(format!("{} has no default branch", self.project_path)))
    }

    async fn create_pr(&self, new: &NewPullRequest) -> Result<PullRequest> {
        debug!(head = %new.head, base = %new.base, draft = new.draft, "creating MR");
        let title = new.title_for(Backend::GitLab);
        let payload = CreateMrPayload {
            source_branch: &new.head,
            target_branch: &new.base,
            title: &title,
            description: &new.body,
        };

        let request = self
            .client
            .post(self.project_url("/merge_requests"))
            .header("PRIVATE-TOKEN", &self.token)
            .json(&payload);
        let response = request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::PrAlreadyExists(body));
        }
        let mr: MergeRequest = check(response, "create MR").await?.json().await?;

        let pr: PullRequest = mr.into();
        debug!(mr_iid = pr.number, "created MR");
        Ok(pr)
    }

    async fn list_open_prs(&self, head: &str, base: &str) -> Result<Vec<PullRequest>> {
        debug!(head, base, "listing open MRs");
        let request = self.get(&self.project_url("/merge_requests")).query(&[
            ("state", "opened"),
            ("source_branch", head),
            ("target_branch", base),
        ]);
        let mrs: Vec<MergeRequest> = send(request, "list MRs").await?.json().await?;

        let prs: Vec<PullRequest> = mrs.into_iter().map(Into::into).collect();
        debug!(count = prs.len(), "listed open MRs");
        Ok(prs)
    }

    async fn get_pr(&self, number: u64) -> Result<PullRequest> {
        let request = self
            .get(&self.mr_url(number, ""))
            .query(&[("include_diverged_commits_count", "true")]);
        let mr: MergeRequest = send(request, "get MR").await?.json().await?;

        let pr: PullRequest = mr.into();
        debug!(mr_iid = number, state = %pr.state, "got MR");
        Ok(pr)
    }

    async fn update_pr(&self, number: u64, title: &str, body: &str) -> Result<PullRequest> {
        debug!(mr_iid = number, "updating MR title/description");
        let request = self
            .put(&self.mr_url(number, ""))
            .json(&serde_json::json!({ "title": title, "description": body }));
        let mr: MergeRequest = send(request, "update MR").await?.json().await?;
        Ok(mr.into())
    }

    async fn resolve_user(&self, login: &str) -> Result<String> {
        let request = self.get(&self.api_url("/users")).query(&[("username", login)]);
        let users: Vec<User> = send(request, "find user").await?.json().await?;
        let user = users
            .into_iter()
            .find(|u| u.username == login)
            .ok_or_else(|| Error::GitLabApi(format!("no GitLab user named {login}")))?;
        debug!(login, user_id = user.id, "resolved user");
        Ok(user.id.to_string())
    }

    async fn set_assignee(&self, number: u64, user: &str) -> Result<()> {
        debug!(mr_iid = number, user_id = user, "assigning MR");
        let id: u64 = user
            .parse()
            .map_err(|_| Error::GitLabApi(format!("not a GitLab user id: {user}")))?;
        let request = self
            .put(&self.mr_url(number, ""))
            .json(&serde_json::json!({ "assignee_ids": [id] }));
        send(request, "assign MR").await?;
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        debug!(mr_iid = number, ?labels, "labelling MR");
        let request = self
            .put(&self.mr_url(number, ""))
            .json(&serde_json::json!({ "add_labels": labels.join(",") }));
        send(request, "label MR").await?;
        Ok(())
    }

    async fn commit_status(&self, sha: &str) -> Result<CommitStatus> {
        let request = self.get(&self.project_url("/pipelines")).query(&[
            ("sha", sha),
            ("order_by", "id"),
            ("sort", "desc"),
        ]);
        let pipelines: Vec<Pipeline> = send(request, "list pipelines").await?.json().await?;

        let Some(latest) = pipelines.into_iter().next() else {
            debug!(sha, "no pipeline was found");
            return Ok(CommitStatus {
                state: NO_PIPELINE_STATE.to_string(),
                build_url: None,
            });
        };

        debug!(sha, state = %latest.status, "pipeline status");
        Ok(CommitStatus {
            state: latest.status,
            build_url: latest.web_url.as_deref().map(strip_tracking_params),
        })
    }

    async fn review_status(&self, number: u64) -> Result<ReviewStatus> {
        let approvals: Approvals = send(self.get(&self.mr_url(number, "/approvals")), "approvals")
            .await?
            .json()
            .await?;

        let status = approval_status(approvals.approved_by.len(), approvals.approvals_required);
        debug!(
            mr_iid = number,
            given = approvals.approved_by.len(),
            required = approvals.approvals_required,
            ?status,
            "approval status"
        );
        Ok(status)
    }

    async fn rebase_pr(&self, number: u64) -> Result<()> {
        debug!(mr_iid = number, "rebasing MR");
        send(self.put(&self.mr_url(number, "/rebase")), "rebase MR").await?;
        Ok(())
    }

    async fn merge_pr(&self, number: u64, method: MergeMethod) -> Result<MergeResult> {
        debug!(mr_iid = number, %method, "merging MR");
        // Rebase-vs-merge is a project setting on GitLab; only squash is per request
        let request = self.put(&self.mr_url(number, "/merge")).json(&serde_json::json!({
            "should_remove_source_branch": true,
            "squash": method == MergeMethod::Squash,
        }));
        let mr: MergeRequest = send(request, "merge MR").await?.json().await?;

        let merged = mr.state == "merged";
        let merge_result = MergeResult {
            merged,
            sha: mr.merge_commit_sha.or(mr.squash_commit_sha),
            message: (!merged).then(|| format!("MR state is {}", mr.state)),
        };

        debug!(
            mr_iid = number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting remote branch");
        let url = self.project_url(&format!(
            "/repository/branches/{}",
            urlencoding::encode(branch)
        ));
        let request = self.client.delete(url).header("PRIVATE-TOKEN", &self.token);
        send(request, "delete branch").await?;
        Ok(())
    }
}

/// GitLab blob search for the catalog
pub struct GitLabSearch {
    client: Client,
    token: String,
    base_url: String,
    provider: ProviderConfig,
}

#[derive(Deserialize)]
struct Blob {
    project_id: u64,
}

#[derive(Deserialize)]
struct SearchProject {
    path: String,
    namespace: Namespace,
    #[serde(default)]
    ssh_url_to_repo: String,
}

#[derive(Deserialize)]
struct Namespace {
    full_path: String,
}

impl GitLabSearch {
    /// Search on gitlab.com, or on a self-hosted instance when `backend_url`
    /// is set
    pub fn new(token: &str, backend_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            token: token.to_string(),
            base_url: base_url(backend_url),
            provider: ProviderConfig {
                backend: Backend::GitLab,
                backend_url: backend_url.filter(|u| !u.is_empty()).map(ToString::to_string),
            },
        })
    }

    async fn blobs(&self, query: &str, page: usize) -> Result<Vec<Blob>> {
        let request = self
            .client
            .get(format!("{}/api/v4/search", self.base_url))
            .header("PRIVATE-TOKEN", &self.token)
            .query(&[
                ("scope", "blobs".to_string()),
                ("search", query.to_string()),
                ("per_page", SEARCH_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
        Ok(send(request, "blob search").await?.json().await?)
    }

    async fn project(&self, id: u64) -> Result<SearchProject> {
        let request = self
            .client
            .get(format!("{}/api/v4/projects/{id}", self.base_url))
            .header("PRIVATE-TOKEN", &self.token);
        Ok(send(request, "get project").await?.json().await?)
    }
}

#[async_trait]
impl RepoSearch for GitLabSearch {
    async fn search_repos(&self, query: &str, ctx: &RunContext) -> Result<Vec<Repo>> {
        let mut project_ids = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=SEARCH_MAX_PAGES {
            let blobs = ctx.call(Backend::GitLab, "blob search", || self.blobs(query, page)).await?;
            let count = blobs.len();
            project_ids.extend(blobs.into_iter().map(|b| b.project_id).filter(|id| seen.insert(*id)));
            debug!(page, count, projects = project_ids.len(), "blob search page");
            if count < SEARCH_PAGE_SIZE {
                break;
            }
        }

        let mut repos = Vec::with_capacity(project_ids.len());
        for id in project_ids {
            let project = ctx.call(Backend::GitLab, "get project", || self.project(id)).await?;
            repos.push(Repo::new(
                &project.namespace.full_path,
                &project.path,
                &project.ssh_url_to_repo,
                self.provider.clone(),
            ));
        }
        Ok(repos)
    }
}

//! Stateful mock platform service for testing
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_pr::error::{Error, Result};
use fleet_pr::platform::{PlatformFactory, PlatformService};
use fleet_pr::types::{
    Backend, CommitStatus, MergeMethod, MergeResult, NewPullRequest, PrState, PullRequest,
    ReviewStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Operations that change provider state
pub const MUTATING_OPS: &[&str] = &[
    "create_pr",
    "update_pr",
    "set_assignee",
    "add_labels",
    "rebase_pr",
    "merge_pr",
    "delete_branch",
];

/// Hand-written mock of one repository on a provider
///
/// This manually implements `PlatformService` rather than using a mocking
/// crate, so it can keep real PR state between calls.
///
/// Features:
/// - PR store with auto-incrementing numbers; create refuses duplicates
/// - Call log for verification
/// - Rate-limit injection: fail the next N calls of an operation
/// - Permanent error injection per operation
pub struct MockPlatformService {
    backend: Backend,
    default_branch: String,
    next_number: AtomicU64,
    prs: Mutex<Vec<PullRequest>>,
    statuses: Mutex<HashMap<String, CommitStatus>>,
    default_status: Mutex<CommitStatus>,
    review: Mutex<ReviewStatus>,
    merge_refusal: Mutex<Option<String>>,
    rate_limits: Mutex<HashMap<String, u32>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl MockPlatformService {
    /// Empty repo on `backend` whose default branch is `main`
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            default_branch: "main".to_string(),
            next_number: AtomicU64::new(1),
            prs: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            default_status: Mutex::new(CommitStatus {
                state: "success".to_string(),
                build_url: Some("https://ci.example.test/build/1".to_string()),
            }),
            review: Mutex::new(ReviewStatus::Approved),
            merge_refusal: Mutex::new(None),
            rate_limits: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// GitHub-flavoured mock
    pub fn github() -> Self {
        Self::new(Backend::GitHub)
    }

    /// GitLab-flavoured mock
    pub fn gitlab() -> Self {
        Self::new(Backend::GitLab)
    }

    // === Setup ===

    /// Add a PR directly to the store
    pub fn insert_pr(&self, pr: PullRequest) {
        self.next_number.fetch_max(pr.number + 1, Ordering::SeqCst);
        self.prs.lock().unwrap().push(pr);
    }

    /// Combined status reported for every commit without an explicit one
    pub fn set_default_status(&self, state: &str) {
        self.default_status.lock().unwrap().state = state.to_string();
    }

    /// Combined status reported for one commit
    pub fn set_status(&self, sha: &str, state: &str) {
        self.statuses.lock().unwrap().insert(
            sha.to_string(),
            CommitStatus {
                state: state.to_string(),
                build_url: None,
            },
        );
    }

    /// Review outcome for every PR
    pub fn set_review(&self, review: ReviewStatus) {
        *self.review.lock().unwrap() = review;
    }

    /// Mark a PR merged outside the tool
    pub fn merge_remotely(&self, number: u64, sha: &str) {
        self.with_pr(number, |pr| {
            pr.state = PrState::Merged;
            pr.merge_commit_sha = Some(sha.to_string());
        })
        .unwrap();
    }

    /// Make `merge_pr` answer "not merged" with this message
    pub fn refuse_merge(&self, message: &str) {
        *self.merge_refusal.lock().unwrap() = Some(message.to_string());
    }

    /// Fail the next `times` calls of `op` with a rate-limit error
    pub fn rate_limit(&self, op: &str, times: u32) {
        self.rate_limits
            .lock()
            .unwrap()
            .insert(op.to_string(), times);
    }

    /// Fail every call of `op` with a platform error
    pub fn fail(&self, op: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(op.to_string(), message.to_string());
    }

    // === Inspection ===

    /// Every call made, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times `op` was called
    pub fn calls_to(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    /// Calls that change provider state
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING_OPS.contains(&c.as_str()))
            .collect()
    }

    /// Snapshot of a PR
    pub fn pr(&self, number: u64) -> Option<PullRequest> {
        self.prs
            .lock()
            .unwrap()
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
    }

    /// Snapshot of every PR still open
    pub fn open_prs(&self) -> Vec<PullRequest> {
        self.prs
            .lock()
            .unwrap()
            .iter()
            .filter(|pr| pr.state == PrState::Open)
            .cloned()
            .collect()
    }

    // === Internals ===

    fn enter(&self, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());

        if let Some(remaining) = self.rate_limits.lock().unwrap().get_mut(op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::RateLimited {
                backend: self.backend,
                message: "API rate limit exceeded".to_string(),
            });
        }
        if let Some(message) = self.failures.lock().unwrap().get(op) {
            return Err(Error::Platform(message.clone()));
        }
        Ok(())
    }

    fn with_pr<T>(&self, number: u64, f: impl FnOnce(&mut PullRequest) -> T) -> Result<T> {
        let mut prs = self.prs.lock().unwrap();
        let pr = prs
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or_else(|| Error::Platform(format!("no pull request #{number}")))?;
        Ok(f(pr))
    }
}

#[async_trait]
impl PlatformService for MockPlatformService {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn default_branch(&self) -> Result<String> {
        self.enter("default_branch")?;
        Ok(self.default_branch.clone())
    }

    async fn create_pr(&self, new: &NewPullRequest) -> Result<PullRequest> {
        self.enter("create_pr")?;
        let mut prs = self.prs.lock().unwrap();
        if prs
            .iter()
            .any(|pr| pr.state == PrState::Open && pr.head_ref == new.head && pr.base_ref == new.base)
        {
            return Err(Error::PrAlreadyExists(format!("{} -> {}", new.head, new.base)));
        }
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let pr = make_pr(number, &new.head, &new.title_for(self.backend), &new.body);
        let pr = PullRequest {
            base_ref: new.base.clone(),
            is_draft: new.draft,
            ..pr
        };
        prs.push(pr.clone());
        Ok(pr)
    }

    async fn list_open_prs(&self, head: &str, base: &str) -> Result<Vec<PullRequest>> {
        self.enter("list_open_prs")?;
        Ok(self
            .open_prs()
            .into_iter()
            .filter(|pr| pr.head_ref == head && pr.base_ref == base)
            .collect())
    }

    async fn get_pr(&self, number: u64) -> Result<PullRequest> {
        self.enter("get_pr")?;
        self.with_pr(number, |pr| pr.clone())
    }

    async fn update_pr(&self, number: u64, title: &str, body: &str) -> Result<PullRequest> {
        self.enter("update_pr")?;
        self.with_pr(number, |pr| {
            pr.title = title.to_string();
            pr.body = Some(body.to_string());
            pr.clone()
        })
    }

    async fn resolve_user(&self, login: &str) -> Result<String> {
        self.enter("resolve_user")?;
        Ok(login.to_string())
    }

    async fn set_assignee(&self, number: u64, user: &str) -> Result<()> {
        self.enter("set_assignee")?;
        self.with_pr(number, |pr| pr.assignee = Some(user.to_string()))
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        self.enter("add_labels")?;
        self.with_pr(number, |pr| pr.labels.extend(labels.iter().cloned()))
    }

    async fn commit_status(&self, sha: &str) -> Result<CommitStatus> {
        self.enter("commit_status")?;
        let explicit = self.statuses.lock().unwrap().get(sha).cloned();
        Ok(explicit.unwrap_or_else(|| self.default_status.lock().unwrap().clone()))
    }

    async fn review_status(&self, _number: u64) -> Result<ReviewStatus> {
        self.enter("review_status")?;
        Ok(*self.review.lock().unwrap())
    }

    async fn rebase_pr(&self, number: u64) -> Result<()> {
        self.enter("rebase_pr")?;
        self.with_pr(number, |pr| pr.diverged_commits = Some(0))
    }

    async fn merge_pr(&self, number: u64, _method: MergeMethod) -> Result<MergeResult> {
        self.enter("merge_pr")?;
        if let Some(message) = self.merge_refusal.lock().unwrap().clone() {
            return Ok(MergeResult {
                merged: false,
                sha: None,
                message: Some(message),
            });
        }
        self.with_pr(number, |pr| {
            let sha = format!("merge-{number}");
            pr.state = PrState::Merged;
            pr.merge_commit_sha = Some(sha.clone());
            MergeResult {
                merged: true,
                sha: Some(sha),
                message: None,
            }
        })
    }

    async fn delete_branch(&self, _branch: &str) -> Result<()> {
        self.enter("delete_branch")
    }
}

/// Open, mergeable PR targeting `main`
pub fn make_pr(number: u64, head: &str, title: &str, body: &str) -> PullRequest {
    PullRequest {
        number,
        html_url: format!("https://github.com/acme/repo/pull/{number}"),
        title: title.to_string(),
        body: Some(body.to_string()),
        head_ref: head.to_string(),
        base_ref: "main".to_string(),
        head_sha: format!("head-{number}"),
        state: PrState::Open,
        mergeable: Some(true),
        merge_commit_sha: None,
        assignee: None,
        labels: Vec::new(),
        is_draft: false,
        diverged_commits: None,
    }
}

/// Factory handing out one mock per repo name
#[derive(Default)]
pub struct MockFactory {
    services: Mutex<HashMap<String, Arc<MockPlatformService>>>,
}

impl MockFactory {
    /// Register the mock serving `repo_name`
    pub fn insert(&self, repo_name: &str, service: MockPlatformService) -> Arc<MockPlatformService> {
        let service = Arc::new(service);
        self.services
            .lock()
            .unwrap()
            .insert(repo_name.to_string(), Arc::clone(&service));
        service
    }

    /// The mock serving `repo_name`
    pub fn get(&self, repo_name: &str) -> Arc<MockPlatformService> {
        Arc::clone(&self.services.lock().unwrap()[repo_name])
    }
}

impl PlatformFactory for MockFactory {
    fn service_for(&self, repo: &fleet_pr::types::Repo) -> Result<Arc<dyn PlatformService>> {
        let service = self
            .services
            .lock()
            .unwrap()
            .get(&repo.name)
            .cloned()
            .ok_or_else(|| Error::Auth(format!("no mock for {}", repo.name)))?;
        Ok(service)
    }
}

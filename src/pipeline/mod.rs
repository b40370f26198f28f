//! Per-repo stage drivers
//!
//! Each stage fans out over the selected repos through
//! [`RunContext::parallelize`]. Per repo it reads the previous stage's
//! artifact, does its work and writes its own artifact, success or failure.
//! A repo whose prerequisite stage has not succeeded is skipped, not failed.

use crate::artifact::{
    Artifact, ArtifactStage, ArtifactStore, CloneOutput, MergeOutput, PlanOutput,
    PullRequestRecord, StatusOutput,
};
use crate::error::{Error, Result};
use crate::git::{CloneInput, GitCollaborator, PlanInput};
use crate::merge::{MergeInput, MergeOptions, MergeOutcome, merge};
use crate::platform::PlatformFactory;
use crate::push::{PushInput, push};
use crate::runtime::RunContext;
use crate::status::{StatusReport, derive_status, sync_repo};
use crate::types::Repo;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// What the plan stage runs in every repo
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Change command and its arguments
    pub command: Vec<String>,
    /// Commit message; first line becomes the PR title
    pub commit_message: String,
    /// Feature branch name
    pub branch_name: String,
}

/// PR metadata applied by the push stage
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    /// User to assign
    pub assignee: Option<String>,
    /// Labels to add (GitHub only)
    pub labels: Vec<String>,
    /// Open PRs as drafts
    pub draft: bool,
    /// PR body replacing the commit message remainder
    pub body: Option<String>,
}

/// Stage drivers sharing one run context and artifact store
#[derive(Clone)]
pub struct Pipeline {
    ctx: RunContext,
    store: ArtifactStore,
    git: Arc<dyn GitCollaborator>,
    platforms: Arc<dyn PlatformFactory>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("workdir", &self.store.root())
            .field("parallelism", &self.ctx.parallelism())
            .finish_non_exhaustive()
    }
}

/// Persist a stage result as its artifact and hand the result back.
///
/// A failure that cannot be persisted is still reported; the write error is
/// only logged.
fn record<T: Serialize + Default>(
    store: &ArtifactStore,
    repo: &Repo,
    stage: ArtifactStage,
    result: Result<T>,
) -> Result<()> {
    match result {
        Ok(output) => {
            store.save(&repo.name, stage, &Artifact::success(output))?;
            info!(repo = %repo.full_name(), %stage, "stage succeeded");
            Ok(())
        }
        Err(e) => {
            let artifact = Artifact::failure(T::default(), e.to_string());
            if let Err(save_err) = store.save(&repo.name, stage, &artifact) {
                warn!(repo = %repo.full_name(), %stage, error = %save_err, "could not record failure");
            }
            Err(e)
        }
    }
}

impl Pipeline {
    /// Build the drivers
    pub fn new(
        ctx: RunContext,
        store: ArtifactStore,
        git: Arc<dyn GitCollaborator>,
        platforms: Arc<dyn PlatformFactory>,
    ) -> Self {
        Self {
            ctx,
            store,
            git,
            platforms,
        }
    }

    /// The artifact store
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The run context
    pub const fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Clone every repo. Already-cloned repos are skipped unless `force`.
    pub async fn clone_all(&self, repos: &[Repo], force: bool) -> Result<()> {
        let this = self.clone();
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                async move { this.clone_one(&repo, force).await }
            })
            .await
    }

    async fn clone_one(&self, repo: &Repo, force: bool) -> Result<()> {
        if !force
            && self
                .store
                .load_success::<CloneOutput>(&repo.name, ArtifactStage::Clone)
                .is_some()
        {
            info!(repo = %repo.full_name(), "already cloned");
            return Ok(());
        }

        let result = async {
            let workdir = self.store.ensure_stage_dir(&repo.name, ArtifactStage::Clone)?;
            info!(repo = %repo.full_name(), "cloning");
            self.git
                .clone_repo(&CloneInput {
                    workdir,
                    git_url: repo.clone_url_or_guess(),
                    force,
                })
                .await
        }
        .await;
        record(&self.store, repo, ArtifactStage::Clone, result)
    }

    /// Run the change command in every cloned repo and commit the result.
    ///
    /// Always regenerates the plan, so an edited command can be re-applied.
    pub async fn plan_all(&self, repos: &[Repo], request: PlanRequest) -> Result<()> {
        if request.command.is_empty() {
            return Err(Error::Config("no change command given".to_string()));
        }
        let this = self.clone();
        let request = Arc::new(request);
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                let request = Arc::clone(&request);
                async move { this.plan_one(&repo, &request).await }
            })
            .await
    }

    async fn plan_one(&self, repo: &Repo, request: &PlanRequest) -> Result<()> {
        let Some(clone) = self
            .store
            .load_success::<CloneOutput>(&repo.name, ArtifactStage::Clone)
        else {
            info!(repo = %repo.full_name(), "skipping, must successfully clone first");
            return Ok(());
        };

        let result = async {
            let workdir = self.store.ensure_stage_dir(&repo.name, ArtifactStage::Plan)?;
            info!(repo = %repo.full_name(), "planning");
            self.git
                .plan(&PlanInput {
                    repo_name: repo.name.clone(),
                    repo_dir: clone.output.cloned_dir,
                    workdir,
                    command: request.command.clone(),
                    commit_message: request.commit_message.clone(),
                    branch_name: request.branch_name.clone(),
                })
                .await
        }
        .await;
        record::<PlanOutput>(&self.store, repo, ArtifactStage::Plan, result)
    }

    /// Push every planned repo and converge on one open PR/MR each.
    ///
    /// Re-pushing is safe: the existing PR is found and updated.
    pub async fn push_all(&self, repos: &[Repo], request: PushRequest) -> Result<()> {
        let this = self.clone();
        let request = Arc::new(request);
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                let request = Arc::clone(&request);
                async move { this.push_one(&repo, &request).await }
            })
            .await
    }

    async fn push_one(&self, repo: &Repo, request: &PushRequest) -> Result<()> {
        let Some(plan) = self
            .store
            .load_success::<PlanOutput>(&repo.name, ArtifactStage::Plan)
        else {
            info!(repo = %repo.full_name(), "skipping, must successfully plan first");
            return Ok(());
        };

        let result = async {
            let platform = self.platforms.service_for(repo)?;
            info!(repo = %repo.full_name(), branch = %plan.output.branch_name, "pushing");
            let input = PushInput {
                plan_dir: plan.output.plan_dir,
                branch_name: plan.output.branch_name,
                commit_message: plan.output.commit_message,
                body_override: request.body.clone(),
                assignee: request.assignee.clone(),
                labels: request.labels.clone(),
                draft: request.draft,
            };
            push(&self.ctx, self.git.as_ref(), platform.as_ref(), &input).await
        }
        .await;
        record::<PullRequestRecord>(&self.store, repo, ArtifactStage::Push, result)
    }

    /// Merge every pushed repo whose PR passes the gates.
    ///
    /// Blocked PRs are recorded as failed merges with the block reason;
    /// re-run `merge` once they are ready.
    pub async fn merge_all(&self, repos: &[Repo], options: MergeOptions) -> Result<()> {
        let this = self.clone();
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                async move { this.merge_one(&repo, options).await }
            })
            .await
    }

    async fn merge_one(&self, repo: &Repo, options: MergeOptions) -> Result<()> {
        if self
            .store
            .load_success::<MergeOutput>(&repo.name, ArtifactStage::Merge)
            .is_some()
        {
            info!(repo = %repo.full_name(), "already merged");
            return Ok(());
        }
        let Some(pushed) = self
            .store
            .load_success::<PullRequestRecord>(&repo.name, ArtifactStage::Push)
        else {
            info!(repo = %repo.full_name(), "skipping, must successfully push first");
            return Ok(());
        };

        let result = async {
            let platform = self.platforms.service_for(repo)?;
            let input = MergeInput {
                number: pushed.output.number,
                commit_sha: pushed.output.commit_sha,
            };
            match merge(&self.ctx, platform.as_ref(), &input, options).await? {
                MergeOutcome::Merged {
                    merge_commit_sha, ..
                } => Ok(MergeOutput { merge_commit_sha }),
                MergeOutcome::Blocked(readiness) => Err(Error::MergeBlocked(
                    readiness
                        .block_message()
                        .unwrap_or_else(|| readiness.to_string()),
                )),
            }
        }
        .await;
        record(&self.store, repo, ArtifactStage::Merge, result)
    }

    /// Derive and persist every repo's status. Local only, no remote calls.
    ///
    /// Reports come back sorted by repo name.
    pub async fn status_all(&self, repos: &[Repo]) -> Result<Vec<(Repo, StatusReport)>> {
        let reports = Arc::new(Mutex::new(Vec::with_capacity(repos.len())));
        let this = self.clone();
        let sink = Arc::clone(&reports);
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                let sink = Arc::clone(&sink);
                async move {
                    let report = this.status_one(&repo)?;
                    sink.lock().await.push((repo, report));
                    Ok(())
                }
            })
            .await?;

        let mut reports = std::mem::take(&mut *reports.lock().await);
        reports.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name).then_with(|| a.owner.cmp(&b.owner)));
        Ok(reports)
    }

    fn status_one(&self, repo: &Repo) -> Result<StatusReport> {
        let report = derive_status(&self.store, &repo.name);
        self.store.save(
            &repo.name,
            ArtifactStage::Status,
            &Artifact::success(StatusOutput {
                stage: report.stage,
                details: report.details.clone(),
                checked_at: Utc::now(),
            }),
        )?;
        Ok(report)
    }

    /// Refresh every pushed, unmerged repo from its provider
    pub async fn sync_all(&self, repos: &[Repo]) -> Result<()> {
        let this = self.clone();
        self.ctx
            .parallelize(repos, move |repo| {
                let this = this.clone();
                async move {
                    if this
                        .store
                        .load_success::<PullRequestRecord>(&repo.name, ArtifactStage::Push)
                        .is_none()
                    {
                        return Ok(());
                    }
                    let platform = this.platforms.service_for(&repo)?;
                    // Readiness lands in the push artifact for `status`
                    sync_repo(&this.ctx, &this.store, platform.as_ref(), &repo.name)
                        .await
                        .map(|_| ())
                }
            })
            .await
    }
}

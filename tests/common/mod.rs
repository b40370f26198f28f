//! Shared test fixtures

#![allow(dead_code)]

pub mod mock_platform;

pub use mock_platform::{MockFactory, MockPlatformService, make_pr};

use async_trait::async_trait;
use fleet_pr::artifact::{
    Artifact, ArtifactStage, ArtifactStore, CloneOutput, PlanOutput, PullRequestRecord,
};
use fleet_pr::error::{Error, Result};
use fleet_pr::git::{CloneInput, GitCollaborator, PlanInput};
use fleet_pr::pipeline::Pipeline;
use fleet_pr::runtime::RunContext;
use fleet_pr::types::{Backend, ProviderConfig, Repo};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Diff touching two files
pub const TWO_FILE_DIFF: &str =
    "diff --git a/a.txt b/a.txt\n+x\ndiff --git a/b.txt b/b.txt\n+y\n";

/// Repo on github.com
pub fn github_repo(name: &str) -> Repo {
    Repo::new(
        "acme",
        name,
        &format!("git@github.com:acme/{name}.git"),
        ProviderConfig::saas(Backend::GitHub),
    )
}

/// Repo on gitlab.com
pub fn gitlab_repo(name: &str) -> Repo {
    Repo::new(
        "acme/platform",
        name,
        &format!("git@gitlab.com:acme/platform/{name}.git"),
        ProviderConfig::saas(Backend::GitLab),
    )
}

/// Git collaborator that touches only the workdir
///
/// Clones create an empty `cloned` directory, plans an empty `planned`
/// directory plus a canned diff, pushes return `sha-<branch>`.
#[derive(Default)]
pub struct MockGit {
    failing: Mutex<HashSet<String>>,
    clones: Mutex<Vec<String>>,
    pushes: Mutex<Vec<String>>,
}

impl MockGit {
    /// Fail every git operation for repos whose URL or name contains `needle`
    pub fn fail_for(&self, needle: &str) {
        self.failing.lock().unwrap().insert(needle.to_string());
    }

    /// URLs cloned so far
    pub fn clones(&self) -> Vec<String> {
        self.clones.lock().unwrap().clone()
    }

    /// Branches pushed so far
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    fn check(&self, subject: &str) -> Result<()> {
        if self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| subject.contains(needle.as_str()))
        {
            return Err(Error::Git(format!("simulated failure for {subject}")));
        }
        Ok(())
    }
}

#[async_trait]
impl GitCollaborator for MockGit {
    async fn clone_repo(&self, input: &CloneInput) -> Result<CloneOutput> {
        self.check(&input.git_url)?;
        self.clones.lock().unwrap().push(input.git_url.clone());
        let cloned_dir = input.workdir.join("cloned");
        std::fs::create_dir_all(&cloned_dir)?;
        Ok(CloneOutput { cloned_dir })
    }

    async fn plan(&self, input: &PlanInput) -> Result<PlanOutput> {
        self.check(&input.repo_name)?;
        let plan_dir = input.workdir.join("planned");
        std::fs::create_dir_all(&plan_dir)?;
        Ok(PlanOutput {
            plan_dir,
            git_diff: TWO_FILE_DIFF.to_string(),
            commit_message: input.commit_message.clone(),
            branch_name: input.branch_name.clone(),
        })
    }

    async fn force_push(&self, plan_dir: &Path, branch: &str) -> Result<String> {
        self.check(&plan_dir.to_string_lossy())?;
        self.pushes.lock().unwrap().push(branch.to_string());
        Ok(format!("sha-{branch}"))
    }
}

/// Pipeline over mocks with no throttling or retries
pub fn mock_pipeline(
    workdir: &Path,
    git: Arc<MockGit>,
    factory: Arc<MockFactory>,
) -> Pipeline {
    Pipeline::new(
        RunContext::unthrottled(4),
        ArtifactStore::new(workdir),
        git,
        factory,
    )
}

/// Seed successful clone and plan artifacts for a repo
pub fn seed_planned(store: &ArtifactStore, repo: &str, branch: &str, message: &str) {
    store
        .save(
            repo,
            ArtifactStage::Clone,
            &Artifact::success(CloneOutput {
                cloned_dir: store.stage_dir(repo, ArtifactStage::Clone).join("cloned"),
            }),
        )
        .unwrap();
    store
        .save(
            repo,
            ArtifactStage::Plan,
            &Artifact::success(PlanOutput {
                plan_dir: store.stage_dir(repo, ArtifactStage::Plan).join("planned"),
                git_diff: TWO_FILE_DIFF.to_string(),
                commit_message: message.to_string(),
                branch_name: branch.to_string(),
            }),
        )
        .unwrap();
}

/// Seed a successful push artifact on top of [`seed_planned`]
pub fn seed_pushed(store: &ArtifactStore, repo: &str, number: u64) {
    seed_planned(store, repo, "fleet-change", "Apply change");
    store
        .save(
            repo,
            ArtifactStage::Push,
            &Artifact::success(PullRequestRecord {
                commit_sha: format!("head-{number}"),
                url: format!("https://github.com/acme/{repo}/pull/{number}"),
                number,
                combined_status: "pending".to_string(),
                assignee: String::new(),
                build_url: String::new(),
                readiness: String::new(),
            }),
        )
        .unwrap();
}

/// Path helper for readability in assertions
pub fn artifact(store: &ArtifactStore, repo: &str, stage: ArtifactStage) -> PathBuf {
    store.artifact_path(repo, stage)
}

//! Git and shell collaborators for the clone, plan and push stages
//!
//! Everything here shells out. The trait keeps the stage drivers testable
//! without a git binary or network.

use crate::artifact::{CloneOutput, PlanOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Environment variable exposing the repo name to change commands
pub const REPO_ENV_VAR: &str = "FLEET_REPO";

/// Input for cloning one repo
#[derive(Debug, Clone)]
pub struct CloneInput {
    /// Stage directory; the clone lands in `{workdir}/cloned`
    pub workdir: PathBuf,
    /// URL to clone
    pub git_url: String,
    /// Re-clone even when a clone exists
    pub force: bool,
}

/// Input for planning one repo
#[derive(Debug, Clone)]
pub struct PlanInput {
    /// Repo name, exported to the command as [`REPO_ENV_VAR`]
    pub repo_name: String,
    /// Existing clone to copy
    pub repo_dir: PathBuf,
    /// Stage directory; the copy lands in `{workdir}/planned`
    pub workdir: PathBuf,
    /// Change command and its arguments
    pub command: Vec<String>,
    /// Commit message
    pub commit_message: String,
    /// Branch to commit on
    pub branch_name: String,
}

/// Local git operations used by the pipeline
#[async_trait]
pub trait GitCollaborator: Send + Sync {
    /// Clone a repo, skipping when already cloned unless forced
    async fn clone_repo(&self, input: &CloneInput) -> Result<CloneOutput>;

    /// Copy the clone, run the change command, commit on a new branch
    async fn plan(&self, input: &PlanInput) -> Result<PlanOutput>;

    /// Force-push HEAD of `plan_dir` to `branch`; returns the pushed SHA
    async fn force_push(&self, plan_dir: &Path, branch: &str) -> Result<String>;
}

/// [`GitCollaborator`] backed by the `git` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellGit;

async fn run(program: &str, args: &[&str], dir: &Path, env: &[(&str, &str)]) -> Result<String> {
    debug!(program, ?args, dir = %dir.display(), "running command");
    let mut command = Command::new(program);
    command.args(args).current_dir(dir);
    for (key, value) in env {
        command.env(key, value);
    }

    let output = command
        .output()
        .await
        .map_err(|e| Error::Git(format!("failed to run {program}: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::Git(format!(
        "`{program} {}` failed ({}): {}{}",
        args.join(" "),
        output.status,
        stdout.trim(),
        stderr.trim()
    )))
}

#[async_trait]
impl GitCollaborator for ShellGit {
    async fn clone_repo(&self, input: &CloneInput) -> Result<CloneOutput> {
        let cloned_dir = input.workdir.join("cloned");
        if cloned_dir.exists() {
            if !input.force {
                debug!(dir = %cloned_dir.display(), "already cloned");
                return Ok(CloneOutput { cloned_dir });
            }
            tokio::fs::remove_dir_all(&cloned_dir).await?;
        }
        tokio::fs::create_dir_all(&input.workdir).await?;

        let target = cloned_dir.to_string_lossy();
        run(
            "git",
            &["clone", &input.git_url, &target],
            &input.workdir,
            &[],
        )
        .await?;
        Ok(CloneOutput { cloned_dir })
    }

    async fn plan(&self, input: &PlanInput) -> Result<PlanOutput> {
        let Some((program, args)) = input.command.split_first() else {
            return Err(Error::Config("no change command given".to_string()));
        };

        // Start from a fresh copy so an edited command can be re-planned
        let plan_dir = input.workdir.join("planned");
        if plan_dir.exists() {
            tokio::fs::remove_dir_all(&plan_dir).await?;
        }
        tokio::fs::create_dir_all(&input.workdir).await?;
        let target = plan_dir.to_string_lossy();
        run("cp", &["-R", "./.", &target], &input.repo_dir, &[]).await?;

        let env = [(REPO_ENV_VAR, input.repo_name.as_str())];
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run(program, &args, &plan_dir, &env).await?;
        run("git", &["checkout", "-b", &input.branch_name], &plan_dir, &env).await?;
        run("git", &["add", "-A"], &plan_dir, &env).await?;
        run("git", &["commit", "-m", &input.commit_message], &plan_dir, &env).await?;
        let git_diff = run("git", &["diff", "HEAD^", "HEAD"], &plan_dir, &env).await?;

        Ok(PlanOutput {
            plan_dir,
            git_diff,
            commit_message: input.commit_message.clone(),
            branch_name: input.branch_name.clone(),
        })
    }

    async fn force_push(&self, plan_dir: &Path, branch: &str) -> Result<String> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        run("git", &["push", "-f", "origin", &refspec], plan_dir, &[]).await?;
        let sha = run("git", &["rev-parse", "HEAD"], plan_dir, &[]).await?;
        Ok(sha.trim().to_string())
    }
}

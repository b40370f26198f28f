//! Per-repo, per-stage result records
//!
//! Every stage writes one JSON artifact per repo. A successful artifact is
//! terminal for normal re-runs, which is what makes the pipeline resumable:
//! re-invoking a stage skips repos that already succeeded and retries the rest.

mod storage;

pub use storage::{ArtifactStore, CATALOG_FILE};
pub(crate) use storage::{read_json, write_json};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stages that persist an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactStage {
    /// `git clone`
    Clone,
    /// Change command + commit
    Plan,
    /// Force-push + PR reconciliation
    Push,
    /// Merge
    Merge,
    /// Last status derivation
    Status,
}

impl ArtifactStage {
    /// Directory and file stem for this stage
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Plan => "plan",
            Self::Push => "push",
            Self::Merge => "merge",
            Self::Status => "status",
        }
    }
}

impl std::fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest pipeline stage a repo has reached (derived, never persisted alone)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    /// In the catalog, nothing else done
    Initialized,
    /// Clone succeeded
    Cloned,
    /// Plan succeeded
    Planned,
    /// Push succeeded
    Pushed,
    /// Merge succeeded
    Merged,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Cloned => write!(f, "cloned"),
            Self::Planned => write!(f, "planned"),
            Self::Pushed => write!(f, "pushed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// A persisted stage result
///
/// On disk the stage output is flattened next to `success` and `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact<T> {
    /// Whether the stage succeeded
    pub success: bool,
    /// Stage-specific output
    #[serde(flatten)]
    pub output: T,
    /// Error text when unsuccessful
    #[serde(
        rename = "Error",
        alias = "error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

impl<T> Artifact<T> {
    /// Successful artifact
    pub const fn success(output: T) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Failed artifact carrying whatever output was gathered
    pub fn failure(output: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
        }
    }
}

/// Output of the clone stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutput {
    /// Where the repo was cloned
    #[serde(default)]
    pub cloned_dir: PathBuf,
}

/// Output of the plan stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutput {
    /// Copy of the clone carrying the new commit
    #[serde(default)]
    pub plan_dir: PathBuf,
    /// `git diff HEAD^ HEAD` of the change
    #[serde(default)]
    pub git_diff: String,
    /// Commit message used
    #[serde(default)]
    pub commit_message: String,
    /// Feature branch name
    #[serde(default)]
    pub branch_name: String,
}

/// Output of the push stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Pushed head commit
    #[serde(default)]
    pub commit_sha: String,
    /// PR/MR web URL
    #[serde(default)]
    pub url: String,
    /// PR number / MR iid
    #[serde(default)]
    pub number: u64,
    /// Combined build status at last check
    #[serde(default)]
    pub combined_status: String,
    /// Assignee login
    #[serde(default)]
    pub assignee: String,
    /// CI build URL
    #[serde(default)]
    pub build_url: String,
    /// Merge readiness from the last sync
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub readiness: String,
}

/// Output of the merge stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutput {
    /// Merge commit SHA
    #[serde(default)]
    pub merge_commit_sha: String,
}

/// Output of the status stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOutput {
    /// Highest stage reached
    pub stage: PipelineStage,
    /// Human-readable detail
    #[serde(default)]
    pub details: String,
    /// When the status was derived
    pub checked_at: DateTime<Utc>,
}

impl Default for StatusOutput {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Initialized,
            details: String::new(),
            checked_at: Utc::now(),
        }
    }
}

//! Status aggregation
//!
//! [`derive_status`] is read-only: it scans a repo's artifacts in stage
//! order and reports the highest stage reached. [`sync_repo`] refreshes the
//! push artifact from the provider and records remote merges.

use crate::artifact::{
    Artifact, ArtifactStage, ArtifactStore, CloneOutput, MergeOutput, PipelineStage, PlanOutput,
    PullRequestRecord,
};
use crate::error::Result;
use crate::merge::{Readiness, check_build, check_pull_request, check_reviews};
use crate::platform::PlatformService;
use crate::runtime::RunContext;
use owo_colors::OwoColorize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Derived status of one repo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Highest stage reached
    pub stage: PipelineStage,
    /// Human-readable detail
    pub details: String,
    /// First stage whose artifact recorded a failure
    pub failed_stage: Option<ArtifactStage>,
}

impl StatusReport {
    const fn ok(stage: PipelineStage, details: String) -> Self {
        Self {
            stage,
            details,
            failed_stage: None,
        }
    }

    /// Details for the terminal, failures in red
    pub fn styled_details(&self) -> String {
        if self.failed_stage.is_some() {
            self.details.red().to_string()
        } else {
            self.details.clone()
        }
    }
}

/// Count files touched by a unified diff.
///
/// An empty diff touches zero files; non-empty text without any
/// `diff --git` header does not parse.
pub fn count_changed_files(diff: &str) -> Option<usize> {
    if diff.trim().is_empty() {
        return Some(0);
    }
    match diff.lines().filter(|l| l.starts_with("diff --git ")).count() {
        0 => None,
        n => Some(n),
    }
}

enum Scan<T> {
    Missing,
    Failed(String),
    Succeeded(T),
}

fn scan<T: DeserializeOwned>(store: &ArtifactStore, repo_name: &str, stage: ArtifactStage) -> Scan<T> {
    match store.load::<T>(repo_name, stage) {
        Ok(None) => Scan::Missing,
        Ok(Some(artifact)) if artifact.success => Scan::Succeeded(artifact.output),
        Ok(Some(artifact)) => Scan::Failed(artifact.error.unwrap_or_default()),
        Err(e) => Scan::Failed(e.to_string()),
    }
}

fn failed(stage: PipelineStage, at: ArtifactStage, message: &str) -> StatusReport {
    StatusReport {
        stage,
        details: format!("({at} error) {message}"),
        failed_stage: Some(at),
    }
}

/// Highest stage reached, scanning artifacts in order and stopping at the
/// first missing or unsuccessful one
pub fn derive_status(store: &ArtifactStore, repo_name: &str) -> StatusReport {
    match scan::<CloneOutput>(store, repo_name, ArtifactStage::Clone) {
        Scan::Missing => return StatusReport::ok(PipelineStage::Initialized, String::new()),
        Scan::Failed(e) => return failed(PipelineStage::Initialized, ArtifactStage::Clone, &e),
        Scan::Succeeded(_) => {}
    }

    let plan = match scan::<PlanOutput>(store, repo_name, ArtifactStage::Plan) {
        Scan::Missing => return StatusReport::ok(PipelineStage::Cloned, String::new()),
        Scan::Failed(e) => return failed(PipelineStage::Cloned, ArtifactStage::Plan, &e),
        Scan::Succeeded(plan) => plan,
    };
    let planned_details = count_changed_files(&plan.git_diff)
        .map(|n| format!("{n} file(s) modified"))
        .unwrap_or_default();

    let push = match scan::<PullRequestRecord>(store, repo_name, ArtifactStage::Push) {
        Scan::Missing => return StatusReport::ok(PipelineStage::Planned, planned_details),
        Scan::Failed(e) => return failed(PipelineStage::Planned, ArtifactStage::Push, &e),
        Scan::Succeeded(push) => push,
    };
    let pushed_details = [&push.url, &push.combined_status, &push.readiness]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    match scan::<MergeOutput>(store, repo_name, ArtifactStage::Merge) {
        Scan::Missing => StatusReport::ok(PipelineStage::Pushed, pushed_details),
        Scan::Failed(e) => failed(PipelineStage::Pushed, ArtifactStage::Merge, &e),
        Scan::Succeeded(merge) => StatusReport::ok(
            PipelineStage::Merged,
            format!("{} merged {}", push.url, merge.merge_commit_sha)
                .trim_end()
                .to_string(),
        ),
    }
}

/// Outcome of refreshing one pushed repo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Refreshed push record (as persisted)
    pub record: PullRequestRecord,
    /// Where the PR stands
    pub readiness: Readiness,
}

/// Refresh a pushed repo's PR from the provider.
///
/// Rewrites the push artifact's commit SHA, combined status, build URL and
/// readiness.
/// A PR found merged remotely gets a successful merge artifact. Returns
/// `None` when the repo has not been pushed, or is already recorded as
/// merged.
pub async fn sync_repo(
    ctx: &RunContext,
    store: &ArtifactStore,
    platform: &dyn PlatformService,
    repo_name: &str,
) -> Result<Option<SyncReport>> {
    let Some(push) = store.load_success::<PullRequestRecord>(repo_name, ArtifactStage::Push) else {
        debug!(repo = repo_name, "not pushed, nothing to sync");
        return Ok(None);
    };
    if store
        .load_success::<MergeOutput>(repo_name, ArtifactStage::Merge)
        .is_some()
    {
        debug!(repo = repo_name, "already recorded as merged");
        return Ok(None);
    }

    let mut record = push.output;
    let backend = platform.backend();
    let pr = ctx
        .call(backend, "get pull request", || platform.get_pr(record.number))
        .await?;
    if !pr.head_sha.is_empty() {
        record.commit_sha.clone_from(&pr.head_sha);
    }

    let status = ctx
        .call(backend, "commit status", || {
            platform.commit_status(&record.commit_sha)
        })
        .await?;
    record.combined_status.clone_from(&status.state);
    if let Some(url) = status.build_url.clone() {
        record.build_url = url;
    }

    // Same ordered checks as merge, always requiring review approval
    let readiness = match check_pull_request(&pr).or_else(|| check_build(&status)) {
        Some(readiness) => readiness,
        None => {
            let review = ctx
                .call(backend, "review status", || platform.review_status(pr.number))
                .await?;
            check_reviews(review).unwrap_or(Readiness::Ready)
        }
    };
    record.readiness = readiness.as_str().to_string();
    store.save(
        repo_name,
        ArtifactStage::Push,
        &Artifact::success(record.clone()),
    )?;

    if let Readiness::AlreadyMerged { merge_commit_sha } = &readiness {
        store.save(
            repo_name,
            ArtifactStage::Merge,
            &Artifact::success(MergeOutput {
                merge_commit_sha: merge_commit_sha.clone(),
            }),
        )?;
    }

    info!(repo = repo_name, number = pr.number, readiness = %readiness, "synced");
    Ok(Some(SyncReport { record, readiness }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const DIFF: &str = "diff --git a/a.txt b/a.txt\n+x\ndiff --git a/b.txt b/b.txt\n+y\n";

    fn planned(store: &ArtifactStore) {
        store
            .save(
                "web",
                ArtifactStage::Clone,
                &Artifact::success(CloneOutput {
                    cloned_dir: PathBuf::from("/w/web/clone/cloned"),
                }),
            )
            .unwrap();
        store
            .save(
                "web",
                ArtifactStage::Plan,
                &Artifact::success(PlanOutput {
                    git_diff: DIFF.to_string(),
                    ..PlanOutput::default()
                }),
            )
            .unwrap();
    }

    #[test]
    fn test_count_changed_files() {
        assert_eq!(count_changed_files(DIFF), Some(2));
        assert_eq!(count_changed_files(""), Some(0));
        assert_eq!(count_changed_files("fatal: bad revision"), None);
    }

    #[test]
    fn test_fresh_repo_is_initialized() {
        let temp = TempDir::new().unwrap();
        let report = derive_status(&ArtifactStore::new(temp.path()), "web");
        assert_eq!(report.stage, PipelineStage::Initialized);
        assert!(report.details.is_empty());
    }

    #[test]
    fn test_planned_reports_file_count() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        planned(&store);

        let report = derive_status(&store, "web");
        assert_eq!(report.stage, PipelineStage::Planned);
        assert_eq!(report.details, "2 file(s) modified");
    }

    #[test]
    fn test_failed_push_keeps_planned_stage() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        planned(&store);
        store
            .save(
                "web",
                ArtifactStage::Push,
                &Artifact::failure(PullRequestRecord::default(), "permission denied"),
            )
            .unwrap();

        let report = derive_status(&store, "web");
        assert_eq!(report.stage, PipelineStage::Planned);
        assert_eq!(report.details, "(push error) permission denied");
        assert_eq!(report.failed_stage, Some(ArtifactStage::Push));
    }

    #[test]
    fn test_pushed_details_include_readiness() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        planned(&store);
        let mut record = PullRequestRecord {
            url: "https://github.com/acme/web/pull/3".to_string(),
            number: 3,
            combined_status: "failure".to_string(),
            ..PullRequestRecord::default()
        };
        store
            .save("web", ArtifactStage::Push, &Artifact::success(record.clone()))
            .unwrap();
        assert_eq!(
            derive_status(&store, "web").details,
            "https://github.com/acme/web/pull/3 failure"
        );

        record.readiness = "build-failed".to_string();
        store
            .save("web", ArtifactStage::Push, &Artifact::success(record))
            .unwrap();
        let report = derive_status(&store, "web");
        assert_eq!(report.stage, PipelineStage::Pushed);
        assert_eq!(
            report.details,
            "https://github.com/acme/web/pull/3 failure build-failed"
        );
    }

    #[test]
    fn test_scan_stops_at_first_gap() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        // A merge artifact without a clone does not count
        store
            .save(
                "web",
                ArtifactStage::Merge,
                &Artifact::success(MergeOutput {
                    merge_commit_sha: "m".to_string(),
                }),
            )
            .unwrap();
        assert_eq!(derive_status(&store, "web").stage, PipelineStage::Initialized);
    }
}

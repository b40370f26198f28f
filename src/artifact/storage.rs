//! Persistence for stage artifacts under the workdir.
//!
//! Layout: `{workdir}/{repo}/{stage}/{stage}.json` plus `{workdir}/init.json`.
//! Paths are partitioned by (repo, stage), so concurrent workers never write
//! the same file.

use super::{Artifact, ArtifactStage};
use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Filename for the repo catalog.
pub const CATALOG_FILE: &str = "init.json";

/// Root of all persisted run state
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: workdir.into(),
        }
    }

    /// The workdir
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to `init.json`
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// Directory owned by one stage of one repo
    pub fn stage_dir(&self, repo_name: &str, stage: ArtifactStage) -> PathBuf {
        self.root.join(repo_name).join(stage.as_str())
    }

    /// Path to a stage's artifact file
    pub fn artifact_path(&self, repo_name: &str, stage: ArtifactStage) -> PathBuf {
        self.stage_dir(repo_name, stage)
            .join(format!("{}.json", stage.as_str()))
    }

    /// Load a stage artifact.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load<T: DeserializeOwned>(
        &self,
        repo_name: &str,
        stage: ArtifactStage,
    ) -> Result<Option<Artifact<T>>> {
        let path = self.artifact_path(repo_name, stage);
        read_json(&path)
    }

    /// Load a stage artifact only if it exists and succeeded.
    ///
    /// Unreadable artifacts count as absent; callers treat both as an unmet
    /// precondition.
    pub fn load_success<T: DeserializeOwned>(
        &self,
        repo_name: &str,
        stage: ArtifactStage,
    ) -> Option<Artifact<T>> {
        match self.load::<T>(repo_name, stage) {
            Ok(Some(artifact)) if artifact.success => Some(artifact),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(repo = repo_name, %stage, error = %e, "ignoring unreadable artifact");
                None
            }
        }
    }

    /// Save a stage artifact, creating the stage directory if needed.
    pub fn save<T: Serialize>(
        &self,
        repo_name: &str,
        stage: ArtifactStage,
        artifact: &Artifact<T>,
    ) -> Result<()> {
        let path = self.artifact_path(repo_name, stage);
        write_json(&path, artifact)
    }

    /// Create (if needed) and return a stage directory
    pub fn ensure_stage_dir(&self, repo_name: &str, stage: ArtifactStage) -> Result<PathBuf> {
        let dir = self.stage_dir(repo_name, stage);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Artifact(format!("failed to create {}: {e}", dir.display())))?;
        Ok(dir)
    }
}

/// Read a JSON file, `Ok(None)` when missing.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Artifact(format!("failed to read {}: {e}", path.display())))?;

    let value = serde_json::from_str(&content)
        .map_err(|e| Error::Artifact(format!("failed to parse {}: {e}", path.display())))?;

    Ok(Some(value))
}

/// Write pretty JSON via a temp file + rename so readers never see a torn file.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.exists()
    {
        fs::create_dir_all(dir)
            .map_err(|e| Error::Artifact(format!("failed to create {}: {e}", dir.display())))?;
    }

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Artifact(format!("failed to serialize {}: {e}", path.display())))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .map_err(|e| Error::Artifact(format!("failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Artifact(format!("failed to write {}: {e}", path.display())))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CloneOutput, PullRequestRecord};
    use tempfile::TempDir;

    #[test]
    fn test_artifact_path_layout() {
        let store = ArtifactStore::new("/tmp/fleet");
        let path = store.artifact_path("widgets", ArtifactStage::Push);
        assert_eq!(path, PathBuf::from("/tmp/fleet/widgets/push/push.json"));
        assert_eq!(store.catalog_path(), PathBuf::from("/tmp/fleet/init.json"));
    }

    #[test]
    fn test_load_missing_file_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let loaded = store
            .load::<CloneOutput>("widgets", ArtifactStage::Clone)
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        assert!(!store.stage_dir("widgets", ArtifactStage::Clone).exists());

        store
            .save(
                "widgets",
                ArtifactStage::Clone,
                &Artifact::success(CloneOutput {
                    cloned_dir: PathBuf::from("/x/cloned"),
                }),
            )
            .unwrap();

        assert!(store.artifact_path("widgets", ArtifactStage::Clone).exists());
        assert!(!store
            .artifact_path("widgets", ArtifactStage::Clone)
            .with_extension("json.tmp")
            .exists());
    }

    #[test]
    fn test_failure_persists_error_next_to_output() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        store
            .save(
                "widgets",
                ArtifactStage::Push,
                &Artifact::failure(PullRequestRecord::default(), "remote rejected"),
            )
            .unwrap();

        let raw = fs::read_to_string(store.artifact_path("widgets", ArtifactStage::Push)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["Error"], "remote rejected");
        assert!(json.get("error").is_none());
        assert_eq!(json["number"], 0);

        assert!(
            store
                .load_success::<PullRequestRecord>("widgets", ArtifactStage::Push)
                .is_none()
        );
    }

    #[test]
    fn test_success_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let record = PullRequestRecord {
            commit_sha: "abc123".to_string(),
            url: "https://github.com/acme/widgets/pull/7".to_string(),
            number: 7,
            combined_status: "pending".to_string(),
            assignee: "octocat".to_string(),
            build_url: String::new(),
            readiness: "awaiting-review".to_string(),
        };
        store
            .save("widgets", ArtifactStage::Push, &Artifact::success(record.clone()))
            .unwrap();

        let loaded = store
            .load_success::<PullRequestRecord>("widgets", ArtifactStage::Push)
            .unwrap();
        assert_eq!(loaded.output, record);
        assert!(loaded.error.is_none());
    }

    #[test]
    fn test_corrupt_artifact_is_error_but_not_success() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let path = store.artifact_path("widgets", ArtifactStage::Plan);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(store.load::<CloneOutput>("widgets", ArtifactStage::Plan).is_err());
        assert!(
            store
                .load_success::<CloneOutput>("widgets", ArtifactStage::Plan)
                .is_none()
        );
    }

    #[test]
    fn test_lowercase_error_field_still_loads() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let path = store.artifact_path("widgets", ArtifactStage::Clone);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"success":false,"cloned_dir":"","error":"auth failed"}"#).unwrap();

        let loaded = store
            .load::<CloneOutput>("widgets", ArtifactStage::Clone)
            .unwrap()
            .unwrap();
        assert!(!loaded.success);
        assert_eq!(loaded.error.as_deref(), Some("auth failed"));
    }
}

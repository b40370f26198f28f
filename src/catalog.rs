//! The repo catalog (`init.json`)
//!
//! Produced once by `init`, from a provider search or a file of git URLs,
//! and read by every later stage. It records the tool version that created
//! the workdir; a different version refuses to touch it.

use crate::artifact::{ArtifactStore, read_json, write_json};
use crate::error::{Error, Result};
use crate::platform::RepoSearch;
use crate::runtime::RunContext;
use crate::types::{Backend, ProviderConfig, Repo};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Version stamped into new catalogs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static GIT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:ssh|https?|git)://(?:[^@/]+@)?(?P<host>[^/:]+)(?::\d+)?/|[^@\s]+@(?P<scp_host>[^:\s]+):)(?P<path>[^\s]+?)(?:\.git)?/?$",
    )
    .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Targeted repos plus provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Tool version that created the workdir
    pub version: String,
    /// When the catalog was written
    pub created_at: DateTime<Utc>,
    /// Search query used, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Deduplicated repos, sorted by name
    pub repos: Vec<Repo>,
}

impl Catalog {
    /// Catalog for this tool version; repos are deduplicated and sorted
    pub fn new(query: Option<String>, repos: Vec<Repo>) -> Self {
        Self {
            version: VERSION.to_string(),
            created_at: Utc::now(),
            query,
            repos: dedup_repos(repos),
        }
    }
}

/// Drop exact duplicates (first occurrence wins), then sort by name.
///
/// Equality is full-struct: repos that differ in any field, clone URL
/// included, are kept.
pub fn dedup_repos(repos: Vec<Repo>) -> Vec<Repo> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Repo> = repos
        .into_iter()
        .filter(|repo| seen.insert(repo.clone()))
        .collect();
    unique.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.owner.cmp(&b.owner)));
    unique
}

/// Search a provider and deduplicate the results
pub async fn search_catalog(
    search: &dyn RepoSearch,
    query: &str,
    ctx: &RunContext,
) -> Result<Catalog> {
    let found = search.search_repos(query, ctx).await?;
    let catalog = Catalog::new(Some(query.to_string()), found);
    info!(query, repos = catalog.repos.len(), "search complete");
    Ok(catalog)
}

/// Parse a git URL into a repo.
///
/// Accepts `git@host:owner/name.git`, `ssh://git@host/owner/name.git` and
/// `https://host/owner/name`. Nested GitLab groups end up in `owner`. The
/// backend is inferred from the host, falling back to `default_backend`;
/// non-SaaS hosts are recorded as enterprise installs.
pub fn parse_git_url(url: &str, default_backend: Backend) -> Result<Repo> {
    let url = url.trim();
    let caps = GIT_URL
        .captures(url)
        .ok_or_else(|| Error::Config(format!("error parsing {url}: not a git URL")))?;

    let host = caps
        .name("host")
        .or_else(|| caps.name("scp_host"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let path = caps.name("path").map(|m| m.as_str()).unwrap_or_default();
    let Some((owner, name)) = path.rsplit_once('/') else {
        return Err(Error::Config(format!(
            "error parsing {url}: expected owner/name"
        )));
    };

    let backend = if host == Backend::GitHub.default_host() {
        Backend::GitHub
    } else if host == Backend::GitLab.default_host() || host.contains("gitlab") {
        Backend::GitLab
    } else {
        default_backend
    };
    let backend_url = (host != backend.default_host()).then(|| format!("https://{host}"));

    Ok(Repo::new(
        owner,
        name,
        url,
        ProviderConfig {
            backend,
            backend_url,
        },
    ))
}

/// Read one git URL per line; blank lines and `#` comments are ignored
pub fn catalog_from_file(path: &Path, default_backend: Backend) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let repos = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_git_url(line, default_backend))
        .collect::<Result<Vec<_>>>()?;

    Ok(Catalog::new(None, repos))
}

/// Write `init.json`
pub fn save_catalog(store: &ArtifactStore, catalog: &Catalog) -> Result<()> {
    write_json(&store.catalog_path(), catalog)?;
    debug!(path = %store.catalog_path().display(), "saved catalog");
    Ok(())
}

/// Read `init.json` and refuse workdirs from another version
pub fn load_catalog(store: &ArtifactStore) -> Result<Catalog> {
    let catalog: Catalog = read_json(&store.catalog_path())?.ok_or_else(|| {
        Error::Artifact(format!(
            "no catalog in {}; run `fleet init` first",
            store.root().display()
        ))
    })?;
    check_version(&catalog, store.root())?;
    Ok(catalog)
}

/// Exact version match between the catalog and this binary
pub fn check_version(catalog: &Catalog, workdir: &Path) -> Result<()> {
    if catalog.version == VERSION {
        return Ok(());
    }
    Err(Error::IncompatibleWorkdir {
        workdir: workdir.display().to_string(),
        found: catalog.version.clone(),
        current: VERSION.to_string(),
    })
}

/// Repos to operate on: all, or the one named by `--repo`
/// (matched by name or `owner/name`)
pub fn select_repos(catalog: &Catalog, single: Option<&str>) -> Result<Vec<Repo>> {
    let Some(wanted) = single else {
        return Ok(catalog.repos.clone());
    };
    let selected: Vec<Repo> = catalog
        .repos
        .iter()
        .filter(|r| r.name == wanted || r.full_name() == wanted)
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(Error::UnknownRepo(wanted.to_string()));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn github(owner: &str, name: &str) -> Repo {
        Repo::new(
            owner,
            name,
            &format!("git@github.com:{owner}/{name}"),
            ProviderConfig::saas(Backend::GitHub),
        )
    }

    #[test]
    fn test_parse_scp_style_url() {
        let repo = parse_git_url("git@github.com:acme/widgets.git", Backend::GitLab).unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert!(repo.is_github());
        assert!(!repo.is_enterprise());
        assert_eq!(repo.clone_url, "git@github.com:acme/widgets.git");
    }

    #[test]
    fn test_parse_nested_gitlab_group() {
        let repo = parse_git_url("https://gitlab.com/platform/infra/deploy.git", Backend::GitHub)
            .unwrap();
        assert_eq!(repo.owner, "platform/infra");
        assert_eq!(repo.name, "deploy");
        assert!(repo.is_gitlab());
    }

    #[test]
    fn test_parse_self_hosted_url() {
        let repo =
            parse_git_url("ssh://git@git.corp.example:2222/tools/lint.git", Backend::GitLab)
                .unwrap();
        assert!(repo.is_gitlab());
        assert_eq!(
            repo.provider.backend_url.as_deref(),
            Some("https://git.corp.example")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_git_url("not a url", Backend::GitHub).is_err());
        assert!(parse_git_url("https://github.com/onlyowner", Backend::GitHub).is_err());
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let mut catalog = Catalog::new(None, vec![github("acme", "api")]);
        catalog.version = "0.0.1-old".to_string();
        save_catalog(&store, &catalog).unwrap();

        let err = load_catalog(&store).unwrap_err();
        assert!(matches!(err, Error::IncompatibleWorkdir { ref found, .. } if found == "0.0.1-old"));
    }

    #[test]
    fn test_missing_catalog() {
        let temp = TempDir::new().unwrap();
        let err = load_catalog(&ArtifactStore::new(temp.path())).unwrap_err();
        assert!(err.to_string().contains("fleet init"));
    }

    #[test]
    fn test_select_single_repo() {
        let catalog = Catalog::new(None, vec![github("acme", "api"), github("acme", "web")]);
        let selected = select_repos(&catalog, Some("acme/web")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "web");
        assert!(matches!(
            select_repos(&catalog, Some("nope")),
            Err(Error::UnknownRepo(_))
        ));
        assert_eq!(select_repos(&catalog, None).unwrap().len(), 2);
    }

    #[test]
    fn test_catalog_from_file_skips_comments() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repos.txt");
        std::fs::write(
            &path,
            "# targets\ngit@github.com:acme/web\n\ngit@github.com:acme/api\ngit@github.com:acme/web\n",
        )
        .unwrap();

        let catalog = catalog_from_file(&path, Backend::GitHub).unwrap();
        let names: Vec<_> = catalog.repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["api", "web"]);
        assert!(catalog.query.is_none());
    }
}

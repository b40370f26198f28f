//! Platform service factory

use crate::error::{Error, Result};
use crate::platform::{
    GitHubSearch, GitHubService, GitLabSearch, GitLabService, PlatformFactory, PlatformService,
    RepoSearch,
};
use crate::types::{Backend, ProviderConfig, Repo};
use std::sync::Arc;

/// Create a platform service for a repo
pub fn create_platform_service(repo: &Repo, token: &str) -> Result<Box<dyn PlatformService>> {
    let backend_url = repo.provider.backend_url.as_deref();
    match repo.provider.backend {
        Backend::GitHub => Ok(Box::new(GitHubService::new(
            token,
            &repo.owner,
            &repo.name,
            backend_url,
        )?)),
        Backend::GitLab => Ok(Box::new(GitLabService::new(
            token,
            &repo.owner,
            &repo.name,
            backend_url,
        )?)),
    }
}

/// Create a repo search for a provider
pub fn create_repo_search(provider: &ProviderConfig, token: &str) -> Result<Box<dyn RepoSearch>> {
    let backend_url = provider.backend_url.as_deref();
    match provider.backend {
        Backend::GitHub => Ok(Box::new(GitHubSearch::new(token, backend_url)?)),
        Backend::GitLab => Ok(Box::new(GitLabSearch::new(token, backend_url)?)),
    }
}

/// Factory backed by the real provider APIs
#[derive(Clone, Default)]
pub struct ApiPlatformFactory {
    github_token: Option<String>,
    gitlab_token: Option<String>,
}

impl ApiPlatformFactory {
    /// Factory with the tokens available; a missing token only fails repos
    /// hosted on that backend
    pub const fn new(github_token: Option<String>, gitlab_token: Option<String>) -> Self {
        Self {
            github_token,
            gitlab_token,
        }
    }
}

impl std::fmt::Debug for ApiPlatformFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiPlatformFactory")
            .field("github_token", &self.github_token.is_some())
            .field("gitlab_token", &self.gitlab_token.is_some())
            .finish()
    }
}

impl PlatformFactory for ApiPlatformFactory {
    fn service_for(&self, repo: &Repo) -> Result<Arc<dyn PlatformService>> {
        let token = match repo.provider.backend {
            Backend::GitHub => self.github_token.as_deref(),
            Backend::GitLab => self.gitlab_token.as_deref(),
        }
        .ok_or_else(|| Error::Auth(format!("no {} token configured", repo.provider.backend)))?;

        Ok(Arc::from(create_platform_service(repo, token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_only_fails_that_backend() {
        let factory = ApiPlatformFactory::new(None, Some("glpat".to_string()));
        let gitlab = Repo::new("acme", "api", "", ProviderConfig::saas(Backend::GitLab));
        let github = Repo::new("acme", "api", "", ProviderConfig::saas(Backend::GitHub));

        let service = factory.service_for(&gitlab).unwrap();
        assert_eq!(service.backend(), Backend::GitLab);
        assert!(matches!(factory.service_for(&github), Err(Error::Auth(_))));
    }
}

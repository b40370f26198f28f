//! Authentication for GitHub and GitLab
//!
//! Supports environment variables first, then CLI-based auth (gh, glab).

use crate::error::{Error, Result};
use crate::types::Backend;
use tokio::process::Command;
use tracing::debug;

/// Environment variables checked for a GitHub token, in order
pub const GITHUB_TOKEN_VARS: &[&str] = &["GITHUB_API_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Environment variables checked for a GitLab token, in order
pub const GITLAB_TOKEN_VARS: &[&str] = &["GITLAB_API_TOKEN", "GITLAB_TOKEN"];

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from CLI tool (gh or glab)
    Cli,
    /// Token from environment variable
    EnvVar,
}

/// A resolved API token
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// The token itself
    pub token: String,
    /// Where it came from
    pub source: AuthSource,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

fn token_from_env(vars: &[&str]) -> Option<String> {
    token_from_lookup(vars, |var| std::env::var(var).ok())
}

fn token_from_lookup(vars: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    vars.iter()
        .filter_map(|var| lookup(var))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

async fn token_from_cli(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().await.ok()?;
    if !output.status.success() {
        debug!(program, status = %output.status, "CLI auth unavailable");
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

/// Resolve a token for `backend`
pub async fn get_token(backend: Backend) -> Result<AuthToken> {
    let (vars, program, args): (&[&str], &str, &[&str]) = match backend {
        Backend::GitHub => (GITHUB_TOKEN_VARS, "gh", &["auth", "token"]),
        Backend::GitLab => (GITLAB_TOKEN_VARS, "glab", &["config", "get", "token"]),
    };

    if let Some(token) = token_from_env(vars) {
        debug!(%backend, "using token from environment");
        return Ok(AuthToken {
            token,
            source: AuthSource::EnvVar,
        });
    }

    if let Some(token) = token_from_cli(program, args).await {
        debug!(%backend, program, "using token from CLI");
        return Ok(AuthToken {
            token,
            source: AuthSource::Cli,
        });
    }

    Err(Error::Auth(format!(
        "no {backend} token found; set {} or log in with `{program}`",
        vars[0]
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_first_non_empty_env_var_wins() {
        let env = lookup(&[("GITLAB_API_TOKEN", "  "), ("GITLAB_TOKEN", "glpat-123")]);
        assert_eq!(
            token_from_lookup(GITLAB_TOKEN_VARS, env).as_deref(),
            Some("glpat-123")
        );
    }

    #[test]
    fn test_primary_var_preferred() {
        let env = lookup(&[("GH_TOKEN", "ghp_cli"), ("GITHUB_API_TOKEN", "ghp_api")]);
        assert_eq!(
            token_from_lookup(GITHUB_TOKEN_VARS, env).as_deref(),
            Some("ghp_api")
        );
    }

    #[test]
    fn test_no_vars_set() {
        assert!(token_from_lookup(GITHUB_TOKEN_VARS, lookup(&[])).is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AuthToken {
            token: "ghp_secret".to_string(),
            source: AuthSource::EnvVar,
        };
        assert!(!format!("{token:?}").contains("ghp_secret"));
    }
}

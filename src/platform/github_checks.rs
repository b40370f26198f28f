//! GitHub build status through the GraphQL `statusCheckRollup`
//!
//! The REST combined-status endpoint only sees legacy commit statuses, so a
//! repo whose CI runs as check runs (GitHub Actions and most apps) would look
//! pending forever. The rollup folds both kinds into one state.

use crate::error::{Error, Result, mentions_rate_limit};
use crate::platform::github::check_response;
use crate::platform::strip_tracking_params;
use crate::types::{Backend, CommitStatus};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const SAAS_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// State reported when a commit has no statuses or check runs at all
pub const NO_CHECKS_STATE: &str = "none";

const ROLLUP_QUERY: &str = r"query($owner: String!, $name: String!, $oid: GitObjectID!) {
  repository(owner: $owner, name: $name) {
    object(oid: $oid) {
      ... on Commit {
        statusCheckRollup {
          state
          contexts(first: 20) {
            nodes {
              __typename
              ... on StatusContext { targetUrl }
              ... on CheckRun { detailsUrl }
            }
          }
        }
      }
    }
  }
}";

/// GraphQL endpoint for a GitHub instance (`{backend_url}/api/graphql` on
/// Enterprise)
fn graphql_url(backend_url: Option<&str>) -> String {
    match backend_url.filter(|u| !u.is_empty()) {
        Some(url) => format!("{}/api/graphql", url.trim_end_matches('/')),
        None => SAAS_GRAPHQL_URL.to_string(),
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<RollupData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct RollupData {
    repository: Option<RollupRepository>,
}

#[derive(Deserialize)]
struct RollupRepository {
    object: Option<RollupCommit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollupCommit {
    status_check_rollup: Option<Rollup>,
}

#[derive(Deserialize)]
struct Rollup {
    state: String, // SUCCESS, PENDING, FAILURE, ERROR, EXPECTED
    contexts: RollupContexts,
}

#[derive(Deserialize)]
struct RollupContexts {
    #[serde(default)]
    nodes: Vec<RollupContext>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollupContext {
    target_url: Option<String>,
    details_url: Option<String>,
}

/// Turn a rollup into our combined status.
///
/// The state is lowercased. The build URL is the first non-empty status
/// target or check-run details link.
fn status_from_rollup(rollup: Option<Rollup>) -> CommitStatus {
    let Some(rollup) = rollup else {
        return CommitStatus {
            state: NO_CHECKS_STATE.to_string(),
            build_url: None,
        };
    };
    let build_url = rollup
        .contexts
        .nodes
        .iter()
        .filter_map(|c| c.target_url.as_deref().or(c.details_url.as_deref()))
        .find(|u| !u.is_empty())
        .map(strip_tracking_params);
    CommitStatus {
        state: rollup.state.to_lowercase(),
        build_url,
    }
}

/// Reads commit build status over GitHub's GraphQL API
pub struct GitHubChecks {
    http: Client,
    token: String,
    url: String,
}

impl GitHubChecks {
    /// Client for the GitHub instance at `backend_url` (SaaS when `None`)
    pub fn new(http: Client, token: &str, backend_url: Option<&str>) -> Self {
        Self {
            http,
            token: token.to_string(),
            url: graphql_url(backend_url),
        }
    }

    /// Combined status of `sha` in `owner/repo`, covering commit statuses
    /// and check runs
    pub async fn commit_status(&self, owner: &str, repo: &str, sha: &str) -> Result<CommitStatus> {
        let body = json!({
            "query": ROLLUP_QUERY,
            "variables": { "owner": owner, "name": repo, "oid": sha },
        });
        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;
        let response: GraphQlResponse = check_response(response, "status rollup")
            .await?
            .json()
            .await?;

        if let Some(error) = response.errors.first() {
            if error.kind.as_deref() == Some("RATE_LIMITED") || mentions_rate_limit(&error.message) {
                return Err(Error::RateLimited {
                    backend: Backend::GitHub,
                    message: format!("status rollup: {}", error.message),
                });
            }
            return Err(Error::GitHubApi(format!("status rollup failed: {}", error.message)));
        }

        let commit = response
            .data
            .and_then(|d| d.repository)
            .and_then(|r| r.object)
            .ok_or_else(|| Error::GitHubApi(format!("commit {sha} not found in {owner}/{repo}")))?;
        let status = status_from_rollup(commit.status_check_rollup);
        debug!(sha, state = %status.state, "status rollup");
        Ok(status)
    }
}

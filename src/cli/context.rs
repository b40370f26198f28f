//! Shared command context for CLI commands
//!
//! Extracts the setup every stage command needs: config, workdir, catalog,
//! repo selection, run context and provider credentials.

use crate::cli::GlobalArgs;
use fleet_pr::artifact::ArtifactStore;
use fleet_pr::auth::get_token;
use fleet_pr::catalog::{Catalog, load_catalog, select_repos};
use fleet_pr::config::Config;
use fleet_pr::error::Result;
use fleet_pr::git::ShellGit;
use fleet_pr::pipeline::Pipeline;
use fleet_pr::platform::ApiPlatformFactory;
use fleet_pr::runtime::{RunContext, RunOptions};
use fleet_pr::types::{Backend, Repo};
use std::sync::Arc;
use tracing::{debug, warn};

/// Config with command-line overrides applied
pub fn resolve_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = Config::load(global.config.as_deref())?;
    if let Some(workdir) = &global.workdir {
        config.workdir.clone_from(workdir);
    }
    if let Some(parallelism) = global.parallelism {
        config.parallelism = parallelism;
    }
    if let Some(throttle) = global.api_throttle {
        config.api_throttle = throttle;
    }
    Ok(config)
}

/// Shared context for commands that operate on an initialized workdir
pub struct CommandContext {
    /// Effective configuration
    pub config: Config,
    /// The catalog from `init.json`
    pub catalog: Catalog,
    /// Repos selected by `--repo` (all by default)
    pub repos: Vec<Repo>,
    /// Stage drivers
    pub pipeline: Pipeline,
}

impl CommandContext {
    /// Load the catalog and build the pipeline.
    ///
    /// Tokens are resolved only for backends the selected repos use; a
    /// missing token fails just those repos.
    pub async fn new(global: &GlobalArgs, options: impl FnOnce(&mut RunOptions)) -> Result<Self> {
        Self::build(global, options, true).await
    }

    /// Context for commands that only read artifacts
    pub async fn local(global: &GlobalArgs) -> Result<Self> {
        Self::build(global, |_| {}, false).await
    }

    async fn build(
        global: &GlobalArgs,
        options: impl FnOnce(&mut RunOptions),
        remote: bool,
    ) -> Result<Self> {
        let config = resolve_config(global)?;
        let store = ArtifactStore::new(config.workdir.clone());
        let catalog = load_catalog(&store)?;
        let repos = select_repos(&catalog, global.repo.as_deref())?;

        let mut run_options = config.run_options();
        options(&mut run_options);
        let ctx = RunContext::new(run_options);

        let platforms = if remote {
            ApiPlatformFactory::new(
                token_if_needed(&repos, Backend::GitHub).await,
                token_if_needed(&repos, Backend::GitLab).await,
            )
        } else {
            ApiPlatformFactory::default()
        };

        let pipeline = Pipeline::new(ctx, store, Arc::new(ShellGit), Arc::new(platforms));
        Ok(Self {
            config,
            catalog,
            repos,
            pipeline,
        })
    }
}

async fn token_if_needed(repos: &[Repo], backend: Backend) -> Option<String> {
    if !repos.iter().any(|r| r.provider.backend == backend) {
        return None;
    }
    match get_token(backend).await {
        Ok(auth) => {
            debug!(%backend, source = ?auth.source, "resolved token");
            Some(auth.token)
        }
        Err(e) => {
            warn!(%backend, error = %e, "no token; repos on this backend will fail");
            None
        }
    }
}

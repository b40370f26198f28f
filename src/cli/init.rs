//! Init command - discover target repos and write the catalog

use crate::cli::InitArgs;
use crate::cli::GlobalArgs;
use crate::cli::context::resolve_config;
use crate::cli::style::{Stylize, check, spinner};
use anstream::println;
use fleet_pr::artifact::ArtifactStore;
use fleet_pr::auth::get_token;
use fleet_pr::catalog::{catalog_from_file, save_catalog, search_catalog};
use fleet_pr::error::Result;
use fleet_pr::platform::create_repo_search;
use fleet_pr::runtime::RunContext;
use fleet_pr::types::{Backend, ProviderConfig};
use tracing::warn;

/// Run the init command
pub async fn run_init(global: &GlobalArgs, args: InitArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let store = ArtifactStore::new(config.workdir.clone());

    let catalog = if let Some(file) = &args.file {
        catalog_from_file(file, args.provider)?
    } else {
        let query = args.query.unwrap_or_default();
        let backend_url = args.backend_url.or_else(|| match args.provider {
            Backend::GitHub => config.github_url.clone(),
            Backend::GitLab => config.gitlab_url.clone(),
        });
        let provider = ProviderConfig {
            backend: args.provider,
            backend_url,
        };
        let token = get_token(provider.backend).await?;
        let search = create_repo_search(&provider, &token.token)?;
        let ctx = RunContext::new(config.run_options());

        let progress = spinner(format!(
            "Searching {} for {}...",
            provider.backend,
            query.accent()
        ));
        let result = search_catalog(search.as_ref(), &query, &ctx).await;
        progress.finish_and_clear();
        result?
    };

    if store.catalog_path().exists() {
        warn!(path = %store.catalog_path().display(), "replacing existing catalog");
    }
    save_catalog(&store, &catalog)?;

    println!(
        "{} Targeting {} repo(s) in {}",
        check(),
        catalog.repos.len().to_string().emphasis(),
        store.root().display().to_string().accent()
    );
    for repo in &catalog.repos {
        println!("  {}", repo.full_name());
    }
    if catalog.repos.is_empty() {
        println!("{}", "No repos matched.".muted());
    }
    Ok(())
}

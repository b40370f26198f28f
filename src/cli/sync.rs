//! Sync command - refresh PR/MR state from the providers

use crate::cli::GlobalArgs;
use crate::cli::context::CommandContext;
use crate::cli::stages::finish_batch;
use crate::cli::status::print_status;
use crate::cli::style::spinner;
use fleet_pr::error::Result;

/// Run the sync command
///
/// The status table is printed even when some repos failed to sync; the
/// exit status still reports the failures.
pub async fn run_sync(global: &GlobalArgs) -> Result<()> {
    let ctx = CommandContext::new(global, |_| {}).await?;
    let total = ctx.repos.len();

    let progress = spinner(format!("Syncing {total} repo(s)..."));
    let result = ctx.pipeline.sync_all(&ctx.repos).await;
    let result = finish_batch(&progress, "Synced", total, result);

    print_status(&ctx.pipeline, &ctx.repos).await?;
    result
}

//! Clone, plan and push commands

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross, spinner};
use crate::cli::{GlobalArgs, PlanArgs, PushArgs};
use anstream::println;
use fleet_pr::error::Result;
use fleet_pr::pipeline::{PlanRequest, PushRequest};
use indicatif::ProgressBar;

/// Stop the spinner and summarize a batch.
///
/// Hands the batch result back so the caller's exit status reflects it.
pub fn finish_batch(
    progress: &ProgressBar,
    done: &str,
    total: usize,
    result: Result<()>,
) -> Result<()> {
    progress.finish_and_clear();
    match &result {
        Ok(()) => println!("{} {done} {} repo(s)", check(), total.to_string().emphasis()),
        Err(e) => {
            let failed = e.failures().len();
            println!(
                "{} {} of {total} repo(s) failed",
                cross(),
                failed.max(1).to_string().error()
            );
        }
    }
    result
}

/// Run the clone command
pub async fn run_clone(global: &GlobalArgs, force: bool) -> Result<()> {
    let ctx = CommandContext::local(global).await?;
    let total = ctx.repos.len();
    let progress = spinner(format!("Cloning {total} repo(s)..."));
    let result = ctx.pipeline.clone_all(&ctx.repos, force).await;
    finish_batch(&progress, "Cloned", total, result)
}

/// Run the plan command
pub async fn run_plan(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let ctx = CommandContext::local(global).await?;
    let total = ctx.repos.len();
    let progress = spinner(format!(
        "Planning {total} repo(s) on {}...",
        args.branch.accent()
    ));
    let request = PlanRequest {
        command: args.command,
        commit_message: args.message,
        branch_name: args.branch,
    };
    let result = ctx.pipeline.plan_all(&ctx.repos, request).await;
    finish_batch(&progress, "Planned", total, result)
}

/// Run the push command
pub async fn run_push(global: &GlobalArgs, args: PushArgs) -> Result<()> {
    let ctx = CommandContext::new(global, |_| {}).await?;
    let total = ctx.repos.len();
    let progress = spinner(format!("Pushing {total} repo(s)..."));
    let request = PushRequest {
        assignee: args.assignee,
        labels: args.labels.into_iter().filter(|l| !l.is_empty()).collect(),
        draft: args.draft,
        body: args.body,
    };
    let result = ctx.pipeline.push_all(&ctx.repos, request).await;
    finish_batch(&progress, "Pushed", total, result)?;

    println!(
        "{}",
        "Run `fleet status` to see PR links, or `fleet sync` to refresh them.".muted()
    );
    Ok(())
}

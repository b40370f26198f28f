//! Merge command - merge PRs/MRs that pass their gates

use crate::cli::context::CommandContext;
use crate::cli::stages::finish_batch;
use crate::cli::status::print_status;
use crate::cli::style::{Stylize, link, spinner};
use crate::cli::{GlobalArgs, MergeArgs};
use anstream::println;
use dialoguer::Confirm;
use fleet_pr::artifact::{ArtifactStage, ArtifactStore, MergeOutput, PullRequestRecord};
use fleet_pr::config::format_duration;
use fleet_pr::error::{Error, Result};
use fleet_pr::merge::{MergeOptions, ReadinessOptions};
use fleet_pr::types::Repo;

/// Run the merge command
pub async fn run_merge(global: &GlobalArgs, args: MergeArgs) -> Result<()> {
    let throttle = args.throttle;
    let ctx = CommandContext::new(global, |options| {
        if let Some(throttle) = throttle {
            options.merge_throttle = throttle;
        }
    })
    .await?;

    let options = MergeOptions {
        method: args.merge_method.unwrap_or(ctx.config.merge_method),
        readiness: ReadinessOptions {
            require_build_success: !args.ignore_build_status,
            require_review_approval: !args.ignore_review_approval,
        },
    };

    let candidates = merge_candidates(ctx.pipeline.store(), &ctx.repos);
    if candidates.is_empty() {
        println!("{}", "No pushed, unmerged PRs to merge.".muted());
        return Ok(());
    }

    if args.confirm {
        print_merge_preview(&candidates, options);
        let proceed = Confirm::new()
            .with_prompt("Proceed with merge?")
            .default(false)
            .interact()
            .map_err(|e| Error::Internal(format!("failed to read confirmation: {e}")))?;
        if !proceed {
            println!("{}", "Aborted".muted());
            return Ok(());
        }
        println!();
    }

    let total = ctx.repos.len();
    let progress = spinner(format!(
        "Merging {} PR(s) with {}, one every {}...",
        candidates.len(),
        options.method.accent(),
        format_duration(throttle.unwrap_or(ctx.config.merge_throttle))
    ));
    let result = ctx.pipeline.merge_all(&ctx.repos, options).await;
    let result = finish_batch(&progress, "Processed", total, result);

    print_status(&ctx.pipeline, &ctx.repos).await?;
    result
}

/// Repos with a successful push and no successful merge
fn merge_candidates(store: &ArtifactStore, repos: &[Repo]) -> Vec<(Repo, PullRequestRecord)> {
    repos
        .iter()
        .filter(|repo| {
            store
                .load_success::<MergeOutput>(&repo.name, ArtifactStage::Merge)
                .is_none()
        })
        .filter_map(|repo| {
            store
                .load_success::<PullRequestRecord>(&repo.name, ArtifactStage::Push)
                .map(|pushed| (repo.clone(), pushed.output))
        })
        .collect()
}

fn print_merge_preview(candidates: &[(Repo, PullRequestRecord)], options: MergeOptions) {
    println!("{}:", "Merge plan".emphasis());
    println!();
    for (repo, record) in candidates {
        println!(
            "  {} #{} {}",
            repo.full_name().accent(),
            record.number,
            link(&record.url)
        );
    }
    println!();

    let mut gates = Vec::new();
    if options.readiness.require_build_success {
        gates.push("successful build");
    }
    if options.readiness.require_review_approval {
        gates.push("approved review");
    }
    let gates = if gates.is_empty() {
        "none".to_string()
    } else {
        gates.join(", ")
    };
    println!(
        "  {} {}   {} {}",
        "Method:".muted(),
        options.method,
        "Gates:".muted(),
        gates
    );
    println!();
}

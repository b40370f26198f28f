//! Status command - where every repo stands

use crate::cli::GlobalArgs;
use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, link};
use anstream::println;
use fleet_pr::artifact::PipelineStage;
use fleet_pr::error::Result;
use fleet_pr::pipeline::Pipeline;
use fleet_pr::status::StatusReport;
use fleet_pr::types::Repo;

/// Run the status command
pub async fn run_status(global: &GlobalArgs) -> Result<()> {
    let ctx = CommandContext::local(global).await?;
    if let Some(query) = &ctx.catalog.query {
        println!("{} {}", "Query:".muted(), query.accent());
    }
    print_status(&ctx.pipeline, &ctx.repos).await
}

/// Derive, persist and print the status table
pub async fn print_status(pipeline: &Pipeline, repos: &[Repo]) -> Result<()> {
    let reports = pipeline.status_all(repos).await?;
    let width = reports
        .iter()
        .map(|(repo, _)| repo.name.len())
        .max()
        .unwrap_or(0);

    println!();
    for (repo, report) in &reports {
        println!(
            "  {:<width$}  {}  {}",
            repo.name,
            stage_label(report),
            details(report)
        );
    }
    println!();
    Ok(())
}

fn stage_label(report: &StatusReport) -> String {
    let label = format!("{:<11}", report.stage.to_string());
    if report.failed_stage.is_some() {
        return label.warn();
    }
    match report.stage {
        PipelineStage::Merged => label.success(),
        PipelineStage::Pushed => label.accent(),
        _ => label,
    }
}

/// Details with the PR URL made clickable
fn details(report: &StatusReport) -> String {
    if report.failed_stage.is_some() {
        return report.styled_details();
    }
    match report.details.split_once(' ') {
        Some((url, rest)) if url.starts_with("http") => format!("{} {}", link(url), rest.muted()),
        None if report.details.starts_with("http") => link(&report.details),
        _ => report.details.clone(),
    }
}

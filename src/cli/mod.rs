//! Command-line interface for `fleet`

mod context;
mod init;
mod merge;
mod stages;
mod status;
mod style;
mod sync;

pub use style::cross;

use clap::{Args, Parser, Subcommand};
use fleet_pr::config::parse_duration;
use fleet_pr::error::Result;
use fleet_pr::types::{Backend, MergeMethod};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Apply one change across many repositories and shepherd the PRs to merge
#[derive(Debug, Parser)]
#[command(name = "fleet", version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Directory holding the catalog, clones and artifacts
    #[arg(long, global = true, env = "FLEET_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Operate on a single repo (name or owner/name)
    #[arg(short, long, global = true)]
    pub repo: Option<String>,

    /// Repos processed concurrently
    #[arg(short, long, global = true)]
    pub parallelism: Option<usize>,

    /// Minimum spacing between provider API calls, e.g. 720ms
    #[arg(long, global = true, value_parser = parse_duration_arg)]
    pub api_throttle: Option<Duration>,

    /// Config file (default: $FLEET_CONFIG or <config dir>/fleet/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find target repos and create the workdir catalog
    Init(InitArgs),

    /// Clone every targeted repo
    Clone {
        /// Re-clone repos that were already cloned
        #[arg(long)]
        force: bool,
    },

    /// Run a change command in every clone and commit the result
    Plan(PlanArgs),

    /// Push planned changes and open or update PRs/MRs
    Push(PushArgs),

    /// Merge PRs/MRs that pass their gates
    Merge(MergeArgs),

    /// Show where every repo stands
    Status,

    /// Refresh PR/MR state from the providers, then show status
    Sync,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Code search query identifying target repos
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub query: Option<String>,

    /// File with one git URL per line instead of a search
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Provider to search
    #[arg(long, default_value = "github", value_parser = parse_backend)]
    pub provider: Backend,

    /// Base URL of a GitHub Enterprise or self-hosted GitLab instance
    #[arg(long)]
    pub backend_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Branch to commit on
    #[arg(short, long)]
    pub branch: String,

    /// Commit message; the first line becomes the PR title
    #[arg(short, long)]
    pub message: String,

    /// Change command, run inside each repo
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct PushArgs {
    /// User to assign the PR/MR to
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels to add, comma separated (GitHub only)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Open PRs/MRs as drafts
    #[arg(long)]
    pub draft: bool,

    /// PR body to use instead of the commit message remainder
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Minimum spacing between merges, e.g. 30s
    #[arg(short, long, value_parser = parse_duration_arg)]
    pub throttle: Option<Duration>,

    /// Merge without approved reviews
    #[arg(long)]
    pub ignore_review_approval: bool,

    /// Merge without a successful build
    #[arg(long)]
    pub ignore_build_status: bool,

    /// Merge method: merge, squash or rebase
    #[arg(short = 'm', long)]
    pub merge_method: Option<MergeMethod>,

    /// Show the repos to merge and ask before merging
    #[arg(long)]
    pub confirm: bool,
}

fn parse_duration_arg(text: &str) -> std::result::Result<Duration, String> {
    parse_duration(text).map_err(|e| e.to_string())
}

fn parse_backend(text: &str) -> std::result::Result<Backend, String> {
    text.parse()
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins; otherwise `-v` raises fleet's own logs to debug.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "fleet=debug,fleet_pr=debug"
    } else {
        "fleet=info,fleet_pr=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Init(args) => init::run_init(&global, args).await,
        Commands::Clone { force } => stages::run_clone(&global, force).await,
        Commands::Plan(args) => stages::run_plan(&global, args).await,
        Commands::Push(args) => stages::run_push(&global, args).await,
        Commands::Merge(args) => merge::run_merge(&global, args).await,
        Commands::Status => status::run_status(&global).await,
        Commands::Sync => sync::run_sync(&global).await,
    }
}

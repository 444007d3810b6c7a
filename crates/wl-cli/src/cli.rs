//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Worklog reporter.
///
/// Reconstructs work sessions from git history, back-dates them to preceding
/// pulls and flags time spent on several repositories at once.
#[derive(Debug, Parser)]
#[command(name = "wl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a worklog for one or more repositories.
    Report(ReportArgs),

    /// Manage the pull-mark cache.
    #[command(subcommand)]
    Pulls(PullsAction),
}

/// Options for `wl report`.
#[derive(Debug, Clone, Default, Args)]
pub struct ReportArgs {
    /// Repository to include; repeat or comma-separate for several.
    #[arg(long = "repo", required = true, value_delimiter = ',')]
    pub repos: Vec<PathBuf>,

    /// First day to include (YYYY-MM-DD, ISO 8601, or e.g. '3 days ago'). Default: today.
    #[arg(long)]
    pub since: Option<String>,

    /// Last day to include, inclusive. Default: today.
    #[arg(long)]
    pub until: Option<String>,

    /// Cover the last N days ending today; overrides --since/--until.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,

    /// Only count commits whose author name or email contains this text.
    #[arg(long)]
    pub author: Option<String>,

    /// Document title.
    #[arg(long)]
    pub title: Option<String>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output the analysis as JSON.
    #[arg(long)]
    pub json: bool,

    /// Append an LLM-written summary.
    #[arg(long)]
    pub summary: bool,

    /// LLM provider (openai or deepseek).
    #[arg(long)]
    pub provider: Option<String>,

    /// LLM model; defaults to the provider's default.
    #[arg(long)]
    pub model: Option<String>,

    /// File holding a custom system prompt.
    #[arg(long)]
    pub system_prompt_file: Option<PathBuf>,

    /// Maximum gap between commits of one session.
    #[arg(long)]
    pub gap_minutes: Option<i64>,

    /// How far back a pull may move a session start.
    #[arg(long)]
    pub pull_lookback_minutes: Option<i64>,

    /// Merge parallel periods separated by at most this many minutes.
    #[arg(long)]
    pub merge_grace_minutes: Option<i64>,
}

/// Pull-mark cache actions.
#[derive(Debug, Subcommand)]
pub enum PullsAction {
    /// Copy pull entries from each repository's reflog into the cache.
    Record {
        #[arg(long = "repo", required = true, value_delimiter = ',')]
        repos: Vec<PathBuf>,
    },

    /// Show cached pull marks.
    List {
        /// Project name; omit to list projects with mark counts.
        #[arg(long)]
        project: Option<String>,
    },
}

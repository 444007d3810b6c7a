//! Worklog CLI library.
//!
//! This crate provides the CLI interface, the git-backed collaborators and
//! the report renderers.

mod cli;
pub mod commands;
mod config;
pub mod git;
pub mod render;

pub use cli::{Cli, Commands, PullsAction, ReportArgs};
pub use config::{Config, LlmConfig};

//! CLI subcommand implementations.

pub mod pulls;
pub mod report;
pub mod util;

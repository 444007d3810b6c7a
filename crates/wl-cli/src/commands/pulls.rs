//! `wl pulls`: maintain the pull-mark cache.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use wl_core::{ProjectId, PullMarkSource};
use wl_db::Database;

use crate::git::{Reflog, RepoSet};

/// Copies reflog pulls of each repository into the cache.
pub fn record<W: Write>(writer: &mut W, db: &mut Database, repos: &[PathBuf]) -> Result<()> {
    let repos = RepoSet::from_paths(repos)?;
    let reflog = Reflog::new(&repos);
    for project in repos.projects() {
        let marks = reflog
            .pull_marks(project)
            .with_context(|| format!("failed to read reflog of {project}"))?;
        let inserted = db
            .record_pull_marks(project, &marks)
            .with_context(|| format!("failed to cache pull marks of {project}"))?;
        writeln!(
            writer,
            "{project}: {inserted} new of {} pull marks",
            marks.len()
        )?;
    }
    Ok(())
}

/// Prints one project's marks, or every project with its mark count.
pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    project: Option<&str>,
    offset: FixedOffset,
) -> Result<()> {
    let Some(name) = project else {
        let projects = db.projects()?;
        if projects.is_empty() {
            writeln!(writer, "No pull marks recorded.")?;
        }
        for (project, count) in projects {
            writeln!(writer, "{project}\t{count}")?;
        }
        return Ok(());
    };

    let project = ProjectId::new(name).context("invalid project name")?;
    let marks = db.pull_marks_for(&project)?;
    if marks.is_empty() {
        writeln!(writer, "No pull marks recorded for {project}.")?;
    }
    for mark in marks {
        writeln!(
            writer,
            "{}",
            mark.instant.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %z")
        )?;
    }
    Ok(())
}

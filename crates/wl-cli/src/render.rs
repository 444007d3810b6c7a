//! Markdown and JSON rendering of an [`Analysis`].

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use wl_core::{
    Analysis, Event, FeatureWindows, OverlapPeriod, ProjectId, Session, TimestampResolver,
    is_parallel, total_minutes,
};

use crate::git::{CommitDetails, DetailsBySha};

/// Presentation settings shared by both formats.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub title: String,
    /// Offset used for every displayed time and for day grouping.
    pub offset: FixedOffset,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// File statistics and full messages, per project and commit hash.
    pub details: BTreeMap<ProjectId, DetailsBySha>,
}

impl ReportMeta {
    fn details_of(&self, project: &ProjectId, event: &Event) -> Option<&CommitDetails> {
        self.details.get(project)?.get(event.id.as_str())
    }
}

/// How much of each commit to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    /// The worklog itself: statistics and a short file list.
    Report,
    /// Summarizer input: also the full commit message and a longer file list.
    Context,
}

impl Detail {
    const fn max_files(self) -> usize {
        match self {
            Self::Report => 10,
            Self::Context => 20,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    title: &'a str,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    parallel_minutes: i64,
    #[serde(flatten)]
    analysis: &'a Analysis,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    commit_details: &'a BTreeMap<ProjectId, DetailsBySha>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

/// Pretty-printed JSON of the analysis plus report metadata.
pub fn json(
    analysis: &Analysis,
    meta: &ReportMeta,
    summary: Option<&str>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        title: &meta.title,
        since: meta.since,
        until: meta.until,
        parallel_minutes: total_minutes(&analysis.overlap_periods),
        analysis,
        commit_details: &meta.details,
        summary,
    })
}

/// Markdown worklog.
///
/// A single project gets its sessions, feature windows and commits by day.
/// Several projects get the parallel periods first, then per-project time
/// statistics, then each project's commits by day.
pub fn markdown(
    analysis: &Analysis,
    meta: &ReportMeta,
    summary: Option<&str>,
) -> Result<String, fmt::Error> {
    render_markdown(analysis, meta, summary, Detail::Report)
}

/// The worklog as summarizer input, with full commit messages.
pub fn summary_context(analysis: &Analysis, meta: &ReportMeta) -> Result<String, fmt::Error> {
    render_markdown(analysis, meta, None, Detail::Context)
}

fn render_markdown(
    analysis: &Analysis,
    meta: &ReportMeta,
    summary: Option<&str>,
    detail: Detail,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# {}", meta.title)?;
    writeln!(out)?;

    let commits: usize = analysis
        .sessions_by_project
        .values()
        .flatten()
        .map(|session| session.events.len())
        .sum();
    let projects = analysis.sessions_by_project.len();

    if projects > 1 {
        writeln!(out, "{} across {projects} projects", plural(commits, "commit"))?;
    } else {
        writeln!(out, "{}", plural(commits, "commit"))?;
    }
    if analysis.dropped_events > 0 {
        writeln!(out)?;
        writeln!(
            out,
            "> {} skipped: unreadable timestamps",
            plural(analysis.dropped_events, "commit")
        )?;
    }
    writeln!(out)?;

    if projects > 1 {
        write_multi(&mut out, analysis, meta, detail)?;
    } else if let Some((project, sessions)) = analysis.sessions_by_project.iter().next() {
        write_single(&mut out, analysis, meta, project, sessions, detail)?;
    }

    if let Some(text) = summary {
        writeln!(out, "## Summary")?;
        writeln!(out)?;
        writeln!(out, "{}", text.trim_end())?;
    }
    Ok(out)
}

fn write_single(
    out: &mut String,
    analysis: &Analysis,
    meta: &ReportMeta,
    project: &ProjectId,
    sessions: &[Session],
    detail: Detail,
) -> fmt::Result {
    if !sessions.is_empty() {
        writeln!(out, "## Work sessions")?;
        writeln!(out)?;
        writeln!(out, "{}", session_totals(sessions))?;
        writeln!(out)?;
        for (idx, session) in sessions.iter().enumerate() {
            writeln!(out, "- {}", session_line(idx, session, meta.offset, ""))?;
        }
        writeln!(out)?;
    }

    if let Some(windows) = analysis.feature_windows_by_project.get(project) {
        if !windows.is_empty() {
            writeln!(out, "## Feature windows")?;
            writeln!(out)?;
            write_windows(out, windows, meta.offset, "")?;
            writeln!(out)?;
        }
    }

    write_commits_by_day(out, project, sessions, meta, detail)
}

fn write_multi(
    out: &mut String,
    analysis: &Analysis,
    meta: &ReportMeta,
    detail: Detail,
) -> fmt::Result {
    let periods = &analysis.overlap_periods;
    if !periods.is_empty() {
        writeln!(out, "## Parallel work")?;
        writeln!(out)?;
        writeln!(
            out,
            "Detected **{}**, about **{}** of overlap in total.",
            plural(periods.len(), "parallel period"),
            format_minutes(total_minutes(periods))
        )?;
        writeln!(out)?;
        for (idx, period) in periods.iter().enumerate() {
            write_period(out, idx, period, meta.offset)?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "> Parallel time is not additive: count each overlapping period once."
        )?;
        writeln!(out)?;
    }

    writeln!(out, "## Time per project")?;
    writeln!(out)?;
    for (project, sessions) in &analysis.sessions_by_project {
        writeln!(out, "### {project}")?;
        writeln!(out)?;
        if sessions.is_empty() {
            writeln!(out, "- No commits")?;
        } else {
            writeln!(out, "- {}", session_totals(sessions))?;
            for (idx, session) in sessions.iter().enumerate() {
                let marker = if is_parallel(session, project, periods) {
                    " **[parallel]**"
                } else {
                    ""
                };
                writeln!(
                    out,
                    "  - {}",
                    session_line(idx, session, meta.offset, marker)
                )?;
            }
        }
        if let Some(windows) = analysis.feature_windows_by_project.get(project) {
            if !windows.is_empty() {
                writeln!(out, "- Feature windows:")?;
                write_windows(out, windows, meta.offset, "  ")?;
            }
        }
        writeln!(out)?;
    }

    for (project, sessions) in &analysis.sessions_by_project {
        writeln!(out, "# Project: {project}")?;
        writeln!(out)?;
        write_commits_by_day(out, project, sessions, meta, detail)?;
    }
    Ok(())
}

fn write_period(
    out: &mut String,
    idx: usize,
    period: &OverlapPeriod,
    offset: FixedOffset,
) -> fmt::Result {
    let projects: Vec<&str> = period.projects.iter().map(ProjectId::as_str).collect();
    writeln!(
        out,
        "- **Period {}**: {} ({})",
        idx + 1,
        span(period.start, period.end, offset),
        format_minutes(period.duration_minutes)
    )?;
    writeln!(out, "  - Projects: {}", projects.join(", "))
}

fn write_windows(
    out: &mut String,
    windows: &FeatureWindows,
    offset: FixedOffset,
    indent: &str,
) -> fmt::Result {
    for window in windows.values() {
        writeln!(
            out,
            "{indent}- {}: {} ({}, {})",
            window.category,
            span(window.start, window.end, offset),
            format_minutes(window.duration_minutes()),
            plural(window.count, "commit")
        )?;
    }
    Ok(())
}

fn write_commits_by_day(
    out: &mut String,
    project: &ProjectId,
    sessions: &[Session],
    meta: &ReportMeta,
    detail: Detail,
) -> fmt::Result {
    for (day, commits) in commits_by_day(sessions, meta.offset) {
        writeln!(out, "## {day} ({})", plural(commits.len(), "commit"))?;
        writeln!(out)?;
        for (at, event) in commits {
            write!(
                out,
                "- [{}] {} | {}",
                short_sha(event),
                at.format("%H:%M:%S %z"),
                event.message
            )?;
            match meta.details_of(project, event) {
                Some(details) => {
                    writeln!(
                        out,
                        " ({}+/{}-; {})",
                        details.insertions,
                        details.deletions,
                        plural(details.files.len(), "file")
                    )?;
                    write_commit_details(out, event, details, detail)?;
                }
                None => writeln!(out)?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_commit_details(
    out: &mut String,
    event: &Event,
    details: &CommitDetails,
    detail: Detail,
) -> fmt::Result {
    if !details.files.is_empty() {
        let shown = detail.max_files();
        let more = if details.files.len() > shown { " ..." } else { "" };
        let files: Vec<&str> = details.files.iter().take(shown).map(String::as_str).collect();
        writeln!(out, "  - files: {}{more}", files.join(", "))?;
    }
    let body = details.body.trim();
    if detail == Detail::Context && !body.is_empty() && body != event.message.trim() {
        writeln!(out, "  - message:")?;
        for line in body.lines() {
            if line.trim().is_empty() {
                writeln!(out)?;
            } else {
                writeln!(out, "    {line}")?;
            }
        }
    }
    Ok(())
}

type DayCommits<'a> = BTreeMap<NaiveDate, Vec<(DateTime<FixedOffset>, &'a Event)>>;

fn commits_by_day(sessions: &[Session], offset: FixedOffset) -> DayCommits<'_> {
    let resolver = TimestampResolver::new(offset);
    let mut days = DayCommits::new();
    for event in sessions.iter().flat_map(|session| &session.events) {
        // Session members always resolved once already.
        let Ok(instant) = resolver.resolve(event) else {
            continue;
        };
        let local = instant.with_timezone(&offset);
        days.entry(local.date_naive())
            .or_default()
            .push((local, event));
    }
    for commits in days.values_mut() {
        commits.sort_by_key(|(at, _)| *at);
    }
    days
}

fn session_totals(sessions: &[Session]) -> String {
    let total: i64 = sessions.iter().map(|s| s.duration_minutes).sum();
    format!(
        "{}, about {} in total",
        plural(sessions.len(), "session"),
        format_minutes(total)
    )
}

fn session_line(idx: usize, session: &Session, offset: FixedOffset, marker: &str) -> String {
    let pulled = if session.pull_adjusted {
        " (from pull)"
    } else {
        ""
    };
    format!(
        "Session {}: {}{pulled} ({}, {}){marker}",
        idx + 1,
        span(session.start, session.end, offset),
        format_minutes(session.duration_minutes),
        plural(session.events.len(), "commit")
    )
}

/// `2025-10-20 09:00 ~ 09:20`, with the end date repeated only when it differs.
fn span(start: DateTime<Utc>, end: DateTime<Utc>, offset: FixedOffset) -> String {
    let start = start.with_timezone(&offset);
    let end = end.with_timezone(&offset);
    if start.date_naive() == end.date_naive() {
        format!("{} ~ {}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
    } else {
        format!(
            "{} ~ {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        )
    }
}

fn short_sha(event: &Event) -> &str {
    let sha = event.id.as_str();
    sha.get(..8).unwrap_or(sha)
}

/// Formats minutes as `Xh Ym` from one hour up, `Xm` below.
pub fn format_minutes(minutes: i64) -> String {
    if minutes < 0 {
        return "0m".to_string();
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours >= 1 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

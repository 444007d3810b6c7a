//! Cross-project parallel-work detection.
//!
//! # Algorithm
//!
//! 1. Flatten every project's sessions into `(start, end, project)` spans and
//!    sort them.
//! 2. Walk the spans keeping a current group. A span joins the group when it
//!    intersects any member (closed intervals, so touching counts). Groups
//!    therefore chain: A–B and B–C overlapping put A, B and C together even
//!    if A and C are disjoint. A group spanning at least two projects becomes
//!    a raw overlap period.
//! 3. Merge raw periods that overlap or sit within the grace window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, checked_minutes};
use crate::session::Session;
use crate::types::ProjectId;

/// A span of time with sessions from two or more projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Always holds at least two projects.
    pub projects: BTreeSet<ProjectId>,
    /// Whole minutes between `start` and `end`.
    pub duration_minutes: i64,
}

impl OverlapPeriod {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, projects: BTreeSet<ProjectId>) -> Self {
        Self {
            start,
            end,
            projects,
            duration_minutes: (end - start).num_minutes(),
        }
    }

    fn absorb(&mut self, other: Self) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        self.projects.extend(other.projects);
        self.duration_minutes = (self.end - self.start).num_minutes();
    }

    /// Whether `[start, end]` intersects this period (closed bounds).
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(end < self.start || start > self.end)
    }
}

#[derive(Debug, Clone, Copy)]
struct Span<'a> {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    project: &'a ProjectId,
}

/// A group of mutually chained spans under construction.
struct Group<'a> {
    start: DateTime<Utc>,
    /// Latest end among members.
    end: DateTime<Utc>,
    projects: BTreeSet<&'a ProjectId>,
}

impl<'a> Group<'a> {
    fn open(span: Span<'a>) -> Self {
        Self {
            start: span.start,
            end: span.end,
            projects: BTreeSet::from([span.project]),
        }
    }

    /// Spans arrive sorted by start, so a span starts no earlier than any
    /// member. It then intersects some member exactly when it starts no
    /// later than the latest member end.
    fn touches(&self, span: &Span<'_>) -> bool {
        span.start <= self.end
    }

    fn push(&mut self, span: Span<'a>) {
        self.end = self.end.max(span.end);
        self.projects.insert(span.project);
    }

    fn close(self) -> Option<OverlapPeriod> {
        if self.projects.len() < 2 {
            return None;
        }
        let projects = self.projects.into_iter().cloned().collect();
        Some(OverlapPeriod::new(self.start, self.end, projects))
    }
}

/// Finds periods where sessions of two or more projects overlap.
///
/// Returns an empty list when fewer than two projects have sessions.
/// Output is sorted by `start`.
pub fn detect_overlaps(
    sessions_by_project: &BTreeMap<ProjectId, Vec<Session>>,
    merge_grace_minutes: i64,
) -> Result<Vec<OverlapPeriod>, ConfigError> {
    if merge_grace_minutes < 0 {
        return Err(ConfigError::NegativeGrace(merge_grace_minutes));
    }
    let grace = checked_minutes("merge_grace_minutes", merge_grace_minutes)?;

    let active_projects = sessions_by_project
        .values()
        .filter(|sessions| !sessions.is_empty())
        .count();
    if active_projects < 2 {
        return Ok(Vec::new());
    }

    let raw = group_spans(sessions_by_project);
    let merged = merge_with_grace(raw, grace);

    tracing::debug!(
        projects = active_projects,
        periods = merged.len(),
        "detected parallel work"
    );
    Ok(merged)
}

fn group_spans(sessions_by_project: &BTreeMap<ProjectId, Vec<Session>>) -> Vec<OverlapPeriod> {
    let mut spans: Vec<Span<'_>> = sessions_by_project
        .iter()
        .flat_map(|(project, sessions)| {
            sessions.iter().map(move |s| Span {
                start: s.start,
                end: s.end,
                project,
            })
        })
        .collect();
    spans.sort_by(|a, b| {
        (a.start, a.end, a.project).cmp(&(b.start, b.end, b.project))
    });

    let mut periods = Vec::new();
    let mut current: Option<Group<'_>> = None;

    for span in spans {
        match current.as_mut() {
            Some(group) if group.touches(&span) => group.push(span),
            _ => {
                periods.extend(current.take().and_then(Group::close));
                current = Some(Group::open(span));
            }
        }
    }
    periods.extend(current.and_then(Group::close));

    periods
}

fn merge_with_grace(mut raw: Vec<OverlapPeriod>, grace: Duration) -> Vec<OverlapPeriod> {
    raw.sort_by_key(|p| (p.start, p.end));

    let mut merged: Vec<OverlapPeriod> = Vec::with_capacity(raw.len());
    for period in raw {
        match merged.last_mut() {
            // Overlapping periods have a non-positive gap, so one test covers both.
            Some(previous) if period.start - previous.end <= grace => previous.absorb(period),
            _ => merged.push(period),
        }
    }
    merged
}

/// Whether a session of `project` falls inside a period that lists it.
pub fn is_parallel(session: &Session, project: &ProjectId, periods: &[OverlapPeriod]) -> bool {
    periods
        .iter()
        .filter(|p| p.projects.contains(project))
        .any(|p| p.intersects(session.start, session.end))
}

/// Sum of period durations in minutes.
pub fn total_minutes(periods: &[OverlapPeriod]) -> i64 {
    periods.iter().map(|p| p.duration_minutes).sum()
}

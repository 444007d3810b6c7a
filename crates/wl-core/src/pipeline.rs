//! End-to-end analysis of one batch of project histories.

use std::borrow::Cow;
use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ConfigError, CoreConfig};
use crate::event::{AuthorFilter, Event, PullMark};
use crate::feature::{FeatureWindows, aggregate_feature_windows};
use crate::overlap::{OverlapPeriod, detect_overlaps};
use crate::pull::adjust_for_pulls;
use crate::session::{Session, segment_sessions};
use crate::timestamp::TimestampResolver;
use crate::types::ProjectId;

/// The projects under analysis, chosen explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    /// One repository; overlap detection is skipped.
    Single { project: ProjectId, events: Vec<Event> },
    /// Several repositories keyed by project.
    Multi(BTreeMap<ProjectId, Vec<Event>>),
}

impl ProjectScope {
    /// Every project with its events, in project order.
    pub fn projects(&self) -> Vec<(&ProjectId, &[Event])> {
        match self {
            Self::Single { project, events } => vec![(project, events.as_slice())],
            Self::Multi(map) => map.iter().map(|(p, e)| (p, e.as_slice())).collect(),
        }
    }

    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub scope: ProjectScope,
    /// Pull marks per project; projects without an entry get no adjustment.
    pub pull_marks: BTreeMap<ProjectId, Vec<PullMark>>,
    pub author: Option<AuthorFilter>,
}

/// Structured result handed to renderers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    pub sessions_by_project: BTreeMap<ProjectId, Vec<Session>>,
    pub feature_windows_by_project: BTreeMap<ProjectId, FeatureWindows>,
    /// Chronological cross-project overlap periods.
    pub overlap_periods: Vec<OverlapPeriod>,
    /// Events excluded because their timestamp could not be resolved.
    pub dropped_events: usize,
}

struct ProjectAnalysis {
    project: ProjectId,
    sessions: Vec<Session>,
    windows: FeatureWindows,
    dropped: usize,
}

/// Runs segmentation, pull adjustment, window aggregation and overlap
/// detection.
///
/// Configuration is validated before any event is looked at; an invalid
/// value aborts the run with no partial output.
pub fn analyze(input: &AnalysisInput, config: &CoreConfig) -> Result<Analysis, ConfigError> {
    config.validate()?;
    let resolver = TimestampResolver::new(config.local_offset()?);

    let per_project: Vec<ProjectAnalysis> = input
        .scope
        .projects()
        .into_par_iter()
        .map(|(project, events)| {
            let events = filter_author(events, input.author.as_ref());
            let marks = input
                .pull_marks
                .get(project)
                .map_or(&[][..], Vec::as_slice);
            analyze_project(project, &events, marks, config, &resolver)
        })
        .collect::<Result<_, _>>()?;

    let mut analysis = Analysis::default();
    for result in per_project {
        analysis.dropped_events += result.dropped;
        analysis
            .feature_windows_by_project
            .insert(result.project.clone(), result.windows);
        analysis
            .sessions_by_project
            .insert(result.project, result.sessions);
    }

    analysis.overlap_periods =
        detect_overlaps(&analysis.sessions_by_project, config.merge_grace_minutes)?;

    if analysis.dropped_events > 0 {
        tracing::warn!(
            dropped = analysis.dropped_events,
            "some events were skipped because their timestamps could not be parsed"
        );
    }
    tracing::debug!(
        projects = analysis.sessions_by_project.len(),
        overlaps = analysis.overlap_periods.len(),
        "analysis complete"
    );

    Ok(analysis)
}

fn filter_author<'a>(events: &'a [Event], author: Option<&AuthorFilter>) -> Cow<'a, [Event]> {
    match author {
        Some(filter) => Cow::Owned(
            events
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
        ),
        None => Cow::Borrowed(events),
    }
}

fn analyze_project(
    project: &ProjectId,
    events: &[Event],
    marks: &[PullMark],
    config: &CoreConfig,
    resolver: &TimestampResolver,
) -> Result<ProjectAnalysis, ConfigError> {
    let segmentation = segment_sessions(events, config.gap_minutes, resolver)?;
    let mut sessions = segmentation.sessions;
    adjust_for_pulls(&mut sessions, marks, config.pull_lookback_minutes)?;
    let windows = aggregate_feature_windows(events, resolver);

    tracing::debug!(
        project = %project,
        events = events.len(),
        sessions = sessions.len(),
        "analyzed project"
    );

    Ok(ProjectAnalysis {
        project: project.clone(),
        sessions,
        windows,
        dropped: segmentation.dropped.len(),
    })
}

//! Seams for the collaborators that feed the pipeline.
//!
//! A history provider yields a finite, lazy, non-restartable sequence of
//! events for one project and date range. Pagination, rate limits and
//! retries are the implementation's business; the pipeline only ever sees
//! a materialized batch.

use chrono::{DateTime, Utc};

use crate::event::{AuthorFilter, Event, PullMark};
use crate::types::ProjectId;

/// What to fetch from a history provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub project: ProjectId,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// A source of raw commit events.
pub trait HistoryProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The event stream; each item may fail independently.
    type Events: Iterator<Item = Result<Event, Self::Error>>;

    /// Starts fetching events for the query.
    fn fetch(&self, query: &HistoryQuery) -> Result<Self::Events, Self::Error>;
}

/// A source of pull marks for a project.
pub trait PullMarkSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn pull_marks(&self, project: &ProjectId) -> Result<Vec<PullMark>, Self::Error>;
}

/// Drains a provider into a batch, keeping only events accepted by `author`.
///
/// Stops at the first failed item: a partially read history would silently
/// shrink sessions.
pub fn collect_events<P: HistoryProvider>(
    provider: &P,
    query: &HistoryQuery,
    author: Option<&AuthorFilter>,
) -> Result<Vec<Event>, P::Error> {
    let mut events = Vec::new();
    for event in provider.fetch(query)? {
        let event = event?;
        if author.is_none_or(|filter| filter.matches(&event)) {
            events.push(event);
        }
    }
    tracing::debug!(project = %query.project, events = events.len(), "collected history");
    Ok(events)
}

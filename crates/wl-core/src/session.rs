//! Work session segmentation.
//!
//! Clusters one project's events into sessions: events are ordered by
//! instant and a new session starts whenever the distance to the previous
//! event exceeds the gap threshold. The threshold is inclusive, so two
//! events exactly `gap_minutes` apart share a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, checked_minutes};
use crate::event::Event;
use crate::timestamp::{ResolvedEvent, TimestampParseError, TimestampResolver};

/// A contiguous run of work in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session start; may be moved earlier by a pull mark.
    pub start: DateTime<Utc>,
    /// Instant of the last event.
    pub end: DateTime<Utc>,
    /// Whole minutes between `start` and `end`, never less than 1.
    pub duration_minutes: i64,
    /// Instant of the first event, before any pull adjustment.
    pub first_event_at: DateTime<Utc>,
    /// Whether `start` was moved back to a pull mark.
    #[serde(default)]
    pub pull_adjusted: bool,
    /// Member events, ascending by instant.
    pub events: Vec<Event>,
}

impl Session {
    fn from_members(members: &[ResolvedEvent<'_>]) -> Option<Self> {
        let first = members.first()?;
        let last = members.last()?;
        Some(Self {
            start: first.instant,
            end: last.instant,
            duration_minutes: duration_minutes(first.instant, last.instant),
            first_event_at: first.instant,
            pull_adjusted: false,
            events: members.iter().map(|m| m.event.clone()).collect(),
        })
    }

    /// Moves the start back to `instant` and refreshes the duration.
    pub(crate) fn backdate(&mut self, instant: DateTime<Utc>) {
        if instant < self.start {
            self.start = instant;
            self.duration_minutes = duration_minutes(self.start, self.end);
            self.pull_adjusted = true;
        }
    }
}

/// Floors a span to whole minutes with a minimum of one.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(1)
}

/// Sessions for one project plus the events that could not be placed.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub sessions: Vec<Session>,
    pub dropped: Vec<TimestampParseError>,
}

/// Segments a project's events into sessions.
///
/// Events may arrive in any order. Equal instants keep input order so the
/// output is reproducible. Events with unresolvable timestamps are reported
/// in [`Segmentation::dropped`] rather than failing the batch.
pub fn segment_sessions(
    events: &[Event],
    gap_minutes: i64,
    resolver: &TimestampResolver,
) -> Result<Segmentation, ConfigError> {
    if gap_minutes < 1 {
        return Err(ConfigError::GapTooSmall(gap_minutes));
    }
    let gap = checked_minutes("gap_minutes", gap_minutes)?;

    let (mut resolved, dropped) = resolver.resolve_all(events);
    resolved.sort_by_key(|r| (r.instant, r.position));

    let mut sessions = Vec::new();
    let mut current: Vec<ResolvedEvent<'_>> = Vec::new();

    for event in resolved {
        let starts_new_session = current
            .last()
            .is_none_or(|last| event.instant - last.instant > gap);

        if starts_new_session && !current.is_empty() {
            sessions.extend(Session::from_members(&current));
            current.clear();
        }
        current.push(event);
    }
    sessions.extend(Session::from_members(&current));

    tracing::debug!(
        sessions = sessions.len(),
        dropped = dropped.len(),
        "segmented events into sessions"
    );

    Ok(Segmentation { sessions, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventId;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 20, h, m, 0).unwrap()
    }

    fn commit(id: &str, instant: DateTime<Utc>) -> Event {
        Event {
            id: EventId::new(id).unwrap(),
            epoch_seconds: Some(instant.timestamp()),
            raw_time_text: String::new(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            message: format!("feat: {id}"),
        }
    }

    fn ids(session: &Session) -> Vec<&str> {
        session.events.iter().map(|e| e.id.as_str()).collect()
    }

    fn segment(events: &[Event], gap: i64) -> Segmentation {
        segment_sessions(events, gap, &TimestampResolver::default()).unwrap()
    }

    #[test]
    fn splits_on_gap_larger_than_threshold() {
        let events = vec![
            commit("a", at(9, 0)),
            commit("b", at(9, 20)),
            commit("c", at(11, 30)),
        ];
        let result = segment(&events, 60);

        assert_eq!(result.sessions.len(), 2);
        let first = &result.sessions[0];
        assert_eq!((first.start, first.end), (at(9, 0), at(9, 20)));
        assert_eq!(first.duration_minutes, 20);
        let second = &result.sessions[1];
        assert_eq!((second.start, second.end), (at(11, 30), at(11, 30)));
        assert_eq!(second.duration_minutes, 1);
    }

    #[test]
    fn empty_input_yields_no_sessions() {
        let result = segment(&[], 60);
        assert!(result.sessions.is_empty());
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn single_event_is_a_one_minute_session() {
        let result = segment(&[commit("a", at(14, 5))], 60);
        assert_eq!(result.sessions.len(), 1);
        let session = &result.sessions[0];
        assert_eq!(session.start, session.end);
        assert_eq!(session.duration_minutes, 1);
    }

    #[test]
    fn gap_exactly_at_threshold_extends_session() {
        let events = vec![commit("a", at(9, 0)), commit("b", at(10, 0))];
        let result = segment(&events, 60);
        assert_eq!(result.sessions.len(), 1);
        assert_eq!(result.sessions[0].duration_minutes, 60);
    }

    #[test]
    fn one_second_past_threshold_splits() {
        let events = vec![
            commit("a", at(9, 0)),
            commit("b", at(10, 0) + Duration::seconds(1)),
        ];
        let result = segment(&events, 60);
        assert_eq!(result.sessions.len(), 2);
    }

    #[test]
    fn gap_is_measured_from_latest_member_not_session_start() {
        let events = vec![
            commit("a", at(9, 0)),
            commit("b", at(9, 50)),
            commit("c", at(10, 40)),
            commit("d", at(11, 30)),
        ];
        let result = segment(&events, 60);
        assert_eq!(result.sessions.len(), 1);
        assert_eq!(result.sessions[0].duration_minutes, 150);
    }

    #[test]
    fn unordered_input_is_sorted_and_ties_keep_input_order() {
        let events = vec![
            commit("late", at(10, 0)),
            commit("tie-1", at(9, 0)),
            commit("tie-2", at(9, 0)),
        ];
        let result = segment(&events, 60);
        assert_eq!(result.sessions.len(), 1);
        assert_eq!(ids(&result.sessions[0]), vec!["tie-1", "tie-2", "late"]);
    }

    #[test]
    fn duration_floors_partial_minutes() {
        let events = vec![
            commit("a", at(9, 0)),
            commit("b", at(9, 2) + Duration::seconds(59)),
        ];
        let result = segment(&events, 60);
        assert_eq!(result.sessions[0].duration_minutes, 2);
    }

    #[test]
    fn unparseable_events_are_dropped_and_reported() {
        let mut bad = commit("bad", at(9, 0));
        bad.epoch_seconds = None;
        bad.raw_time_text = "not a time".to_string();
        let events = vec![commit("a", at(9, 0)), bad, commit("b", at(9, 10))];

        let result = segment(&events, 60);
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].event_id.as_str(), "bad");
        assert_eq!(ids(&result.sessions[0]), vec!["a", "b"]);
    }

    #[test]
    fn rejects_gap_below_one_minute() {
        let err = segment_sessions(&[], 0, &TimestampResolver::default()).unwrap_err();
        assert_eq!(err, ConfigError::GapTooSmall(0));
    }

    #[test]
    fn sessions_partition_events_and_respect_gap() {
        let minutes = [0, 3, 7, 95, 96, 200, 201, 202, 400, 461, 522];
        let base = at(6, 0);
        let events: Vec<Event> = minutes
            .iter()
            .rev()
            .map(|m| commit(&format!("e{m}"), base + Duration::minutes(*m)))
            .collect();
        let gap = 60;
        let result = segment(&events, gap);

        let mut seen: Vec<&str> = result
            .sessions
            .iter()
            .flat_map(|s| s.events.iter().map(|e| e.id.as_str()))
            .collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);

        for session in &result.sessions {
            assert!(session.start <= session.end);
            assert_eq!(
                session.duration_minutes,
                (session.end - session.start).num_minutes().max(1)
            );
        }
        for pair in result.sessions.windows(2) {
            assert!(pair[1].first_event_at - pair[0].end > Duration::minutes(gap));
        }
    }

    #[test]
    fn segmentation_is_idempotent() {
        let events = vec![
            commit("a", at(9, 0)),
            commit("b", at(12, 0)),
            commit("c", at(9, 30)),
        ];
        let first = segment(&events, 45);
        let second = segment(&events, 45);
        assert_eq!(first.sessions, second.sessions);
    }

    #[test]
    fn unrepresentable_gap_is_an_error() {
        let events = [commit("a", at(9, 0))];
        let err = segment_sessions(&events, i64::MAX, &TimestampResolver::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DurationOverflow {
                field: "gap_minutes",
                ..
            }
        ));
    }

    #[test]
    fn backdate_only_moves_start_earlier() {
        let mut session = segment(&[commit("a", at(9, 0))], 60).sessions.remove(0);
        session.backdate(at(9, 30));
        assert_eq!(session.start, at(9, 0));
        assert!(!session.pull_adjusted);

        session.backdate(at(8, 30));
        assert_eq!(session.start, at(8, 30));
        assert_eq!(session.duration_minutes, 30);
        assert_eq!(session.first_event_at, at(9, 0));
        assert!(session.pull_adjusted);
    }
}

//! Canonical instants for raw events.
//!
//! Resolution order:
//! 1. `epoch_seconds`, when present and representable
//! 2. `raw_time_text` as `%Y-%m-%d %H:%M:%S %z` (git `--date=iso`)
//! 3. `raw_time_text` as a bare `%Y-%m-%d %H:%M:%S` in the configured offset
//! 4. ISO 8601: RFC 3339, then naive `T`-separated forms, then a bare date

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use thiserror::Error;

use crate::event::Event;
use crate::types::EventId;

const ZONED_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";
const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NAIVE_ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// An event whose time could not be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable timestamp for event {event_id}: {text:?}")]
pub struct TimestampParseError {
    pub event_id: EventId,
    pub text: String,
}

/// An event paired with its canonical instant.
///
/// `position` is the event's index in the caller's input, used as a
/// tie-breaker so equal instants keep their input order.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEvent<'a> {
    pub event: &'a Event,
    pub instant: DateTime<Utc>,
    pub position: usize,
}

/// Resolves event times, interpreting zone-less text in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct TimestampResolver {
    local_offset: FixedOffset,
}

impl Default for TimestampResolver {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl TimestampResolver {
    pub const fn new(local_offset: FixedOffset) -> Self {
        Self { local_offset }
    }

    /// Returns the canonical instant for one event.
    pub fn resolve(&self, event: &Event) -> Result<DateTime<Utc>, TimestampParseError> {
        if let Some(instant) = event
            .epoch_seconds
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        {
            return Ok(instant);
        }

        self.parse_text(event.raw_time_text.trim())
            .ok_or_else(|| TimestampParseError {
                event_id: event.id.clone(),
                text: event.raw_time_text.clone(),
            })
    }

    /// Resolves a batch, splitting successes from failures.
    ///
    /// Successes keep input order; callers sort as they need.
    pub fn resolve_all<'a>(
        &self,
        events: &'a [Event],
    ) -> (Vec<ResolvedEvent<'a>>, Vec<TimestampParseError>) {
        let mut resolved = Vec::with_capacity(events.len());
        let mut failures = Vec::new();

        for (position, event) in events.iter().enumerate() {
            match self.resolve(event) {
                Ok(instant) => resolved.push(ResolvedEvent {
                    event,
                    instant,
                    position,
                }),
                Err(err) => {
                    tracing::warn!(event_id = %err.event_id, text = %err.text, "dropping event with unparseable timestamp");
                    failures.push(err);
                }
            }
        }

        (resolved, failures)
    }

    fn parse_text(&self, text: &str) -> Option<DateTime<Utc>> {
        if text.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_str(text, ZONED_FORMAT) {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(text, LOCAL_FORMAT) {
            return self.in_local_offset(naive);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }

        if let Some(naive) = NAIVE_ISO_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        {
            return self.in_local_offset(naive);
        }

        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .ok()
            .and_then(|date| self.in_local_offset(date.and_time(NaiveTime::MIN)))
    }

    fn in_local_offset(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        naive
            .and_local_timezone(self.local_offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(epoch: Option<i64>, text: &str) -> Event {
        Event {
            id: EventId::new("c0ffee").unwrap(),
            epoch_seconds: epoch,
            raw_time_text: text.to_string(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            message: "feat: thing".to_string(),
        }
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 20, h, m, s).unwrap()
    }

    fn offset_hours(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn epoch_takes_precedence_over_text() {
        let resolver = TimestampResolver::default();
        let instant = resolver
            .resolve(&event(Some(utc(4, 34, 56).timestamp()), "1999-01-01 00:00:00 +0000"))
            .unwrap();
        assert_eq!(instant, utc(4, 34, 56));
    }

    #[test]
    fn parses_zoned_git_iso_format() {
        let resolver = TimestampResolver::default();
        let instant = resolver
            .resolve(&event(None, "2025-10-20 12:34:56 +0800"))
            .unwrap();
        assert_eq!(instant, utc(4, 34, 56));
    }

    #[test]
    fn bare_local_time_uses_configured_offset() {
        let resolver = TimestampResolver::new(offset_hours(8));
        let instant = resolver
            .resolve(&event(None, "2025-10-20 12:34:56"))
            .unwrap();
        assert_eq!(instant, utc(4, 34, 56));
    }

    #[test]
    fn falls_back_to_rfc3339() {
        let resolver = TimestampResolver::default();
        let instant = resolver
            .resolve(&event(None, "2025-10-20T12:34:56+08:00"))
            .unwrap();
        assert_eq!(instant, utc(4, 34, 56));
    }

    #[test]
    fn falls_back_to_naive_iso_and_bare_date() {
        let resolver = TimestampResolver::default();
        assert_eq!(
            resolver
                .resolve(&event(None, "2025-10-20T04:34:56.250"))
                .unwrap()
                .timestamp(),
            utc(4, 34, 56).timestamp()
        );
        assert_eq!(
            resolver.resolve(&event(None, "2025-10-20")).unwrap(),
            utc(0, 0, 0)
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let resolver = TimestampResolver::default();
        assert!(resolver.resolve(&event(None, "  2025-10-20 04:34:56\n")).is_ok());
    }

    #[test]
    fn unparseable_text_is_an_error() {
        let resolver = TimestampResolver::default();
        let err = resolver.resolve(&event(None, "yesterday-ish")).unwrap_err();
        assert_eq!(err.event_id.as_str(), "c0ffee");
        assert_eq!(err.text, "yesterday-ish");
    }

    #[test]
    fn unrepresentable_epoch_falls_back_to_text() {
        let resolver = TimestampResolver::default();
        let instant = resolver
            .resolve(&event(Some(i64::MAX), "2025-10-20 04:34:56 +0000"))
            .unwrap();
        assert_eq!(instant, utc(4, 34, 56));
    }

    #[test]
    fn resolve_all_splits_failures_and_keeps_positions() {
        let resolver = TimestampResolver::default();
        let events = vec![
            event(None, "2025-10-20 09:00:00 +0000"),
            event(None, "garbage"),
            event(None, "2025-10-20 08:00:00 +0000"),
        ];
        let (resolved, failures) = resolver.resolve_all(&events);
        assert_eq!(failures.len(), 1);
        let positions: Vec<_> = resolved.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 2]);
    }
}

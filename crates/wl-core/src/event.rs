//! Raw activity events and pull markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EventId;

/// A raw activity event (a commit) as produced by a history provider.
///
/// The event carries its time in whatever shape the provider had it: an
/// optional epoch value and the original text. Resolution into a canonical
/// instant happens in [`crate::timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub id: EventId,
    /// Seconds since the Unix epoch, authoritative when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_seconds: Option<i64>,
    /// The provider's textual timestamp (e.g. `2025-10-20 12:34:56 +0800`).
    #[serde(default)]
    pub raw_time_text: String,
    pub author_name: String,
    pub author_email: String,
    /// Subject line of the commit message.
    pub message: String,
}

/// A synchronization marker (e.g. a `git pull`) for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PullMark {
    pub instant: DateTime<Utc>,
}

impl PullMark {
    pub const fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

/// Restricts events to one author.
///
/// Matches when the needle is a case-insensitive substring of either the
/// author name or the author email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorFilter {
    needle: String,
}

impl AuthorFilter {
    /// Builds a filter; blank needles match nothing useful, so they yield `None`.
    pub fn new(needle: &str) -> Option<Self> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            None
        } else {
            Some(Self { needle })
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.author_name.to_lowercase().contains(&self.needle)
            || event.author_email.to_lowercase().contains(&self.needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, email: &str) -> Event {
        Event {
            id: EventId::new("abc123").unwrap(),
            epoch_seconds: Some(1_700_000_000),
            raw_time_text: String::new(),
            author_name: name.to_string(),
            author_email: email.to_string(),
            message: "fix: typo".to_string(),
        }
    }

    #[test]
    fn author_filter_matches_name_or_email_case_insensitively() {
        let filter = AuthorFilter::new("ALICE").unwrap();
        assert!(filter.matches(&event("Alice Liddell", "al@example.com")));
        assert!(filter.matches(&event("A. L.", "alice@example.com")));
        assert!(!filter.matches(&event("Bob", "bob@example.com")));
    }

    #[test]
    fn author_filter_rejects_blank_needle() {
        assert!(AuthorFilter::new("  ").is_none());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let original = event("Alice", "alice@example.com");
        let json = serde_json::to_string(&original).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn event_rejects_empty_ids() {
        let json = r#"{
            "id": "",
            "raw_time_text": "2025-01-01 00:00:00",
            "author_name": "a",
            "author_email": "a@b",
            "message": "m"
        }"#;
        let result: Result<Event, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}

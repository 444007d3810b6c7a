//! Category time windows.
//!
//! Each commit is classified by its conventional-commit prefix and the
//! windows record, per category, the earliest and latest instant and the
//! number of commits. The fold is associative and commutative, so input
//! order never changes the result.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::timestamp::TimestampResolver;

/// Commit category derived from the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureCategory {
    Feat,
    Fix,
    Docs,
    Build,
    Refactor,
    Chore,
    Perf,
    Test,
    Other,
}

impl FeatureCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Docs => "docs",
            Self::Build => "build",
            Self::Refactor => "refactor",
            Self::Chore => "chore",
            Self::Perf => "perf",
            Self::Test => "test",
            Self::Other => "other",
        }
    }

    /// Classifies a commit subject.
    ///
    /// Takes the text before the first `:`, lowercased, and its first word.
    /// A `(scope)` suffix and a breaking-change `!` are stripped before the
    /// word is matched; anything unknown is [`FeatureCategory::Other`].
    pub fn from_message(message: &str) -> Self {
        let head = message.trim().split(':').next().unwrap_or_default();
        let lowered = head.to_lowercase();
        let word = lowered.split_whitespace().next().unwrap_or_default();
        let token = word
            .split('(')
            .next()
            .unwrap_or_default()
            .trim_end_matches('!');
        token.parse().unwrap_or(Self::Other)
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feat" => Ok(Self::Feat),
            "fix" => Ok(Self::Fix),
            "docs" => Ok(Self::Docs),
            "build" => Ok(Self::Build),
            "refactor" => Ok(Self::Refactor),
            "chore" => Ok(Self::Chore),
            "perf" => Ok(Self::Perf),
            "test" => Ok(Self::Test),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid feature category: {s}")),
        }
    }
}

/// Time span and commit count for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureWindow {
    pub category: FeatureCategory,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

impl FeatureWindow {
    const fn single(category: FeatureCategory, instant: DateTime<Utc>) -> Self {
        Self {
            category,
            start: instant,
            end: instant,
            count: 1,
        }
    }

    /// Combines two windows of the same category.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.category, other.category);
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        self.count += other.count;
    }

    /// Whole minutes covered by the window (zero for a single commit).
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Windows keyed by category, iterated in category order.
pub type FeatureWindows = BTreeMap<FeatureCategory, FeatureWindow>;

/// Folds a project's events into category windows.
///
/// Events whose time cannot be resolved are skipped; the segmenter is the
/// one that reports them.
pub fn aggregate_feature_windows(events: &[Event], resolver: &TimestampResolver) -> FeatureWindows {
    let mut windows = FeatureWindows::new();
    for event in events {
        let Ok(instant) = resolver.resolve(event) else {
            continue;
        };
        let category = FeatureCategory::from_message(&event.message);
        let window = FeatureWindow::single(category, instant);
        windows
            .entry(category)
            .and_modify(|existing| existing.merge(&window))
            .or_insert(window);
    }
    windows
}

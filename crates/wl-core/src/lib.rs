//! Core domain logic for the worklog reporter.
//!
//! This crate contains the fundamental types and logic for:
//! - Timestamp resolution: turning raw commit times into UTC instants
//! - Session segmentation and pull-mark back-dating
//! - Feature windows: per-category commit spans
//! - Overlap detection: finding periods of parallel work across projects

mod config;
pub mod event;
pub mod feature;
pub mod overlap;
mod pipeline;
pub mod provider;
mod pull;
pub mod session;
pub mod timestamp;
pub mod types;

pub use config::{ConfigError, CoreConfig};
pub use event::{AuthorFilter, Event, PullMark};
pub use feature::{FeatureCategory, FeatureWindow, FeatureWindows, aggregate_feature_windows};
pub use overlap::{OverlapPeriod, detect_overlaps, is_parallel, total_minutes};
pub use pipeline::{Analysis, AnalysisInput, ProjectScope, analyze};
pub use provider::{HistoryProvider, HistoryQuery, PullMarkSource, collect_events};
pub use pull::adjust_for_pulls;
pub use session::{Segmentation, Session, segment_sessions};
pub use timestamp::{ResolvedEvent, TimestampParseError, TimestampResolver};
pub use types::{EventId, ProjectId, ValidationError};

//! Back-dating session starts to preceding pull marks.
//!
//! A commit's timestamp understates when work began if the developer pulled
//! first. For every session, the latest pull mark at or before its first
//! event, and no further back than the lookback window, becomes its start.

use crate::config::{ConfigError, checked_minutes};
use crate::event::PullMark;
use crate::session::Session;

/// Applies pull marks to a project's sessions in place.
///
/// Marks may be in any order. Returns how many sessions were adjusted.
/// `end` and member events are never touched.
pub fn adjust_for_pulls(
    sessions: &mut [Session],
    marks: &[PullMark],
    lookback_minutes: i64,
) -> Result<usize, ConfigError> {
    if lookback_minutes < 0 {
        return Err(ConfigError::NegativeLookback(lookback_minutes));
    }
    if marks.is_empty() || sessions.is_empty() {
        return Ok(0);
    }

    let mut sorted = marks.to_vec();
    sorted.sort_unstable();
    let lookback = checked_minutes("pull_lookback_minutes", lookback_minutes)?;

    let mut adjusted = 0;
    for session in sessions.iter_mut() {
        let anchor = session.first_event_at;
        // Marks at or before the anchor form a prefix of the sorted list.
        let upto = sorted.partition_point(|mark| mark.instant <= anchor);
        let Some(candidate) = upto.checked_sub(1).and_then(|i| sorted.get(i)) else {
            continue;
        };
        if anchor - candidate.instant <= lookback && candidate.instant < session.start {
            session.backdate(candidate.instant);
            adjusted += 1;
        }
    }

    tracing::debug!(adjusted, marks = sorted.len(), "applied pull marks");
    Ok(adjusted)
}

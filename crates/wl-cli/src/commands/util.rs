//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

/// Pre-compiled regex for relative day parsing.
static RELATIVE_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(day|week)s?\s+ago$").expect("relative day pattern is valid")
});

/// Conservative bound for relative days (~1000 years).
const MAX_RELATIVE_DAYS: i64 = 1000 * 365;

/// An inclusive range of calendar days in the report's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayRange {
    /// First instant of `first` through the last second of `last`.
    pub fn bounds(&self, offset: FixedOffset) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = to_utc(self.first.and_time(NaiveTime::MIN), offset)?;
        let next = self
            .last
            .succ_opt()
            .with_context(|| format!("no day after {}", self.last))?;
        let end = to_utc(next.and_time(NaiveTime::MIN), offset)? - Duration::seconds(1);
        Ok((start, end))
    }

    pub fn title(&self) -> String {
        format!("Work Log: {} to {}", self.first, self.last)
    }
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    local
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{local} does not exist at offset {offset}"))
}

/// Picks the report's days.
///
/// `days` wins and covers the last N days ending `today`. Otherwise each
/// missing end of the range defaults to `today`.
pub fn resolve_range(
    since: Option<&str>,
    until: Option<&str>,
    days: Option<u32>,
    today: NaiveDate,
) -> anyhow::Result<DayRange> {
    if let Some(days) = days {
        if days == 0 {
            bail!("--days must be at least 1");
        }
        let span = i64::from(days) - 1;
        if span > MAX_RELATIVE_DAYS {
            bail!("--days value too large: {days}");
        }
        let first = today
            .checked_sub_signed(Duration::days(span))
            .with_context(|| format!("--days {days} reaches before the earliest supported date"))?;
        return Ok(DayRange { first, last: today });
    }

    let first = since.map(|s| parse_day(s, today)).transpose()?.unwrap_or(today);
    let last = until.map(|s| parse_day(s, today)).transpose()?.unwrap_or(today);
    if first > last {
        bail!("--since ({first}) is after --until ({last})");
    }
    Ok(DayRange { first, last })
}

/// Parses a calendar day.
///
/// Supports:
/// - `today`, `yesterday`
/// - Dates: "2025-10-20"
/// - ISO 8601 date-times, truncated to their date: "2025-10-20T09:30:00+08:00"
/// - Relative: "3 days ago", "1 week ago"
pub fn parse_day(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    match s {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }

    let Some(caps) = RELATIVE_DAY_RE.captures(s) else {
        bail!(
            "Invalid date: {s}. Use YYYY-MM-DD, ISO 8601 (e.g., 2025-10-20T09:00:00Z) or relative (e.g., '3 days ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;
    let days_per_unit = match &caps[2] {
        "day" => 1,
        "week" => 7,
        unit => bail!("Unknown date unit: {unit}"),
    };
    if n > MAX_RELATIVE_DAYS / days_per_unit {
        bail!("Relative date value too large: {n} {}", &caps[2]);
    }
    Ok(today - Duration::days(n * days_per_unit))
}

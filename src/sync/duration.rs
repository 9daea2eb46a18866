//! ISO-8601 duration parsing for time estimates
//!
//! Accepts `P[nY][nM][nW][nD]T[nH][nM][nS]`. Units are fixed approximations
//! (a year is 365 days, a month 30 days, a week 7 days); no calendar math.
//!
//! The `T` separator is required even when no time component follows, so
//! `P1D` is rejected while `P1DT` is accepted. Estimates exported by existing
//! task data are written in this form, so the narrow grammar is kept as is.
//! Only the start of the string has to match; trailing text is ignored.

use crate::{Result, TjsError};
use regex::Regex;
use std::sync::LazyLock;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?")
        .expect("valid duration regex")
});

/// Seconds per unit, by capture group
const UNIT_SECONDS: [u64; 7] = [YEAR, MONTH, WEEK, DAY, HOUR, MINUTE, 1];

/// Parse a duration string into a total number of seconds
pub fn parse_duration(text: &str) -> Result<u64> {
    let malformed = || TjsError::MalformedDuration(text.to_string());

    let captures = DURATION_RE.captures(text).ok_or_else(malformed)?;

    let mut total: u64 = 0;
    for (group, seconds) in UNIT_SECONDS.iter().enumerate() {
        let Some(value) = captures.get(group + 1) else {
            continue;
        };
        let value: u64 = value.as_str().parse().map_err(|_| malformed())?;
        total = value
            .checked_mul(*seconds)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(malformed)?;
    }
    Ok(total)
}

/// Format seconds as a JIRA time-tracking estimate in whole minutes
pub fn format_estimate(seconds: u64) -> String {
    format!("{}m", seconds / MINUTE)
}

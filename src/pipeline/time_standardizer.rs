//! TimeStandardizer (TS) — spec §4.3. Rule-based, no LLM.
//!
//! Parses the canonical `"Month DD, YYYY HH:MM am|pm"` string AR emits and
//! a handful of duration spellings, in the style of the teacher's
//! `nlp::regex_patterns` module: `once_cell::Lazy` compiled `Regex`
//! patterns, matched up front, no LLM involvement.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{AbsoluteSlot, Instant, IsoDuration, StandardWindow};
use crate::error::PipelineError;

static CANONICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([A-Za-z]+)\s+(\d{1,2}),\s*(\d{4})\s+(\d{1,2}):(\d{2})\s*(am|pm)$").unwrap()
});

static DURATION_UNITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d+)\s*(minutes?|mins?|hours?|hrs?)\s*$").unwrap());

static DURATION_CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+):(\d{2})\s*$").unwrap());

static DURATION_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?\s*$").unwrap());

fn month_number(name: &str) -> Option<u32> {
    let months = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = name.to_lowercase();
    months.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

/// `true` if `s` matches the canonical `"Month DD, YYYY HH:MM am|pm"` form,
/// used by AR to validate its own LLM output before handing it to TS.
pub fn is_canonical(s: &str) -> bool {
    CANONICAL.is_match(s.trim())
}

/// Parses `"Month DD, YYYY HH:MM am|pm"` into a naive (zone-less) datetime.
pub fn parse_canonical(s: &str) -> Result<NaiveDateTime, PipelineError> {
    let caps = CANONICAL
        .captures(s.trim())
        .ok_or_else(|| PipelineError::TsParse(format!("not in canonical form: {s:?}")))?;

    let month = month_number(&caps[1])
        .ok_or_else(|| PipelineError::TsParse(format!("unknown month: {}", &caps[1])))?;
    let day: u32 = caps[2]
        .parse()
        .map_err(|_| PipelineError::TsParse(format!("bad day in {s:?}")))?;
    let year: i32 = caps[3]
        .parse()
        .map_err(|_| PipelineError::TsParse(format!("bad year in {s:?}")))?;
    let mut hour: u32 = caps[4]
        .parse()
        .map_err(|_| PipelineError::TsParse(format!("bad hour in {s:?}")))?;
    let minute: u32 = caps[5]
        .parse()
        .map_err(|_| PipelineError::TsParse(format!("bad minute in {s:?}")))?;
    let is_pm = caps[6].eq_ignore_ascii_case("pm");

    if hour == 12 {
        hour = 0;
    }
    if is_pm {
        hour += 12;
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| PipelineError::TsParse(format!("invalid date in {s:?}")))?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| PipelineError::TsParse(format!("invalid time in {s:?}")))?;
    Ok(NaiveDateTime::new(date, time))
}

/// Parses `"N minutes|hours"`, `"H:MM"`, or ISO-8601 `PT…` into a duration.
pub fn parse_duration(s: &str) -> Result<IsoDuration, PipelineError> {
    let s = s.trim();

    if let Some(caps) = DURATION_ISO.captures(s) {
        if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
            return Err(PipelineError::TsParse(format!("empty ISO duration: {s:?}")));
        }
        let h: i64 = caps.get(1).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        let m: i64 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        let sec: i64 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        return Ok(IsoDuration(chrono::Duration::seconds(
            h * 3600 + m * 60 + sec,
        )));
    }

    if let Some(caps) = DURATION_UNITS.captures(s) {
        let n: i64 = caps[1]
            .parse()
            .map_err(|_| PipelineError::TsParse(format!("bad duration number: {s:?}")))?;
        let unit = caps[2].to_lowercase();
        let minutes = if unit.starts_with("h") { n * 60 } else { n };
        return Ok(IsoDuration::minutes(minutes));
    }

    if let Some(caps) = DURATION_CLOCK.captures(s) {
        let h: i64 = caps[1]
            .parse()
            .map_err(|_| PipelineError::TsParse(format!("bad duration clock: {s:?}")))?;
        let m: i64 = caps[2]
            .parse()
            .map_err(|_| PipelineError::TsParse(format!("bad duration clock: {s:?}")))?;
        return Ok(IsoDuration::minutes(h * 60 + m));
    }

    Err(PipelineError::TsParse(format!(
        "unrecognized duration form: {s:?}"
    )))
}

fn attach_zone(naive: NaiveDateTime, tz: Tz) -> Result<Instant, PipelineError> {
    tz.from_local_datetime(&naive)
        .single()
        .or_else(|| tz.from_local_datetime(&naive).earliest())
        .ok_or_else(|| PipelineError::TsParse(format!("{naive} has no valid offset in {tz}")))
}

/// Resolves an [`AbsoluteSlot`] into a [`StandardWindow`], enforcing the
/// spec §3 invariants (`start <= end`; if all three present,
/// `end - start >= duration`; both ends carry the query's zone offset).
///
/// `now` anchors the no-time-info case (spec §8 S3: "Call mom" carries no
/// temporal expression at all, so SE/AR legitimately resolve nothing — TS
/// then searches `[now, now + 2 days]` rather than treating the absence
/// of any anchor as a parse failure).
pub fn standardize(slot: &AbsoluteSlot, tz: Tz, now: Instant) -> Result<StandardWindow, PipelineError> {
    let duration = slot.duration.as_deref().map(parse_duration).transpose()?;
    let start = slot
        .start_text
        .as_deref()
        .map(|s| parse_canonical(s).and_then(|n| attach_zone(n, tz)))
        .transpose()?;
    let end = slot
        .end_text
        .as_deref()
        .map(|s| parse_canonical(s).and_then(|n| attach_zone(n, tz)))
        .transpose()?;

    let (start, end) = match (start, end, duration) {
        (Some(s), Some(e), _) => (s, e),
        (Some(s), None, Some(d)) => (s, s + d.0),
        (None, Some(e), Some(d)) => (e - d.0, e),
        (Some(s), None, None) => (s, s),
        (None, Some(e), None) => (e, e),
        (None, None, _) => (now, now + chrono::Duration::days(2)),
    };

    if start > end {
        return Err(PipelineError::TsInvariant(format!(
            "start {start} is after end {end}"
        )));
    }
    if let Some(d) = duration {
        if end - start < d.0 {
            return Err(PipelineError::TsInvariant(format!(
                "window {start}..{end} is shorter than declared duration {}",
                d.to_iso8601()
            )));
        }
    }

    Ok(StandardWindow { start, end, duration })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_pm_time() {
        let dt = parse_canonical("November 19, 2025 10:00 am").unwrap();
        assert_eq!(dt.to_string(), "2025-11-19 10:00:00");
    }

    #[test]
    fn parses_noon_and_midnight() {
        let noon = parse_canonical("March 1, 2026 12:00 pm").unwrap();
        assert_eq!(noon.time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let midnight = parse_canonical("March 1, 2026 12:00 am").unwrap();
        assert_eq!(midnight.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("45 minutes").unwrap().num_minutes(), 45);
        assert_eq!(parse_duration("2 hours").unwrap().num_minutes(), 120);
        assert_eq!(parse_duration("1:30").unwrap().num_minutes(), 90);
        assert_eq!(parse_duration("PT1H30M").unwrap().num_minutes(), 90);
    }

    #[test]
    fn rejects_inconsistent_window() {
        let slot = AbsoluteSlot {
            start_text: Some("November 19, 2025 10:00 am".to_string()),
            end_text: Some("November 19, 2025 10:10 am".to_string()),
            duration: Some("45 minutes".to_string()),
        };
        let now = chrono::DateTime::parse_from_rfc3339("2025-11-01T00:00:00-04:00")
            .unwrap()
            .with_timezone(&chrono_tz::America::New_York);
        let err = standardize(&slot, chrono_tz::America::New_York, now).unwrap_err();
        assert!(matches!(err, PipelineError::TsInvariant(_)));
    }

    #[test]
    fn builds_window_from_start_and_duration() {
        let slot = AbsoluteSlot {
            start_text: Some("November 19, 2025 10:00 am".to_string()),
            end_text: None,
            duration: Some("45 minutes".to_string()),
        };
        let now = chrono::DateTime::parse_from_rfc3339("2025-11-01T00:00:00-04:00")
            .unwrap()
            .with_timezone(&chrono_tz::America::New_York);
        let window = standardize(&slot, chrono_tz::America::New_York, now).unwrap();
        assert_eq!((window.end - window.start).num_minutes(), 45);
    }
}

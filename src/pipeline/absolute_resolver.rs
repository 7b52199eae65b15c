//! AbsoluteResolver (AR) — spec §4.2.
//!
//! Resolves a [`RawSlot`]'s relative expressions against a temporal
//! context bundle into the canonical `"Month DD, YYYY HH:MM am|pm"` form.
//! LLM-backed; every non-null output field is validated against the
//! canonical regex before being accepted.

use std::sync::Arc;

use chrono::{Datelike, Duration, Offset, TimeZone};
use chrono_tz::Tz;

use crate::domain::{AbsoluteSlot, Instant, RawSlot};
use crate::error::{PipelineError, Stage};
use crate::llm::LlmClient;

use super::time_standardizer::is_canonical;

/// The temporal context bundle spec §4.2 requires: every field is either
/// the canonical absolute form or an ISO timestamp, so the LLM never has
/// to compute dates itself — only map relative words onto these anchors.
struct TemporalContext {
    now_iso: String,
    tz: String,
    today_human: String,
    today_dow_index: u32,
    is_dst: bool,
    end_of_today: String,
    end_of_week: String,
    end_of_month: String,
    next_monday: String,
    next_occurrences: [String; 7],
}

fn canonical(dt: Instant) -> String {
    dt.format("%B %-d, %Y %-I:%M %P").to_string()
}

/// `tz.to_string()` is the constant IANA zone name and `now.offset()` is a
/// date-dependent abbreviation, so the two are never directly comparable.
/// Detect DST by comparing `now`'s UTC offset against the zone's offset on
/// a fixed January date of the same year, which is never in DST in any
/// zone observing it.
fn is_dst(now: Instant, tz: Tz) -> bool {
    let standard_offset = tz
        .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .map(|dt| dt.offset().fix().local_minus_utc())
        .unwrap_or_else(|| now.offset().fix().local_minus_utc());
    now.offset().fix().local_minus_utc() != standard_offset
}

fn build_context(now: Instant, tz: Tz) -> TemporalContext {
    let today_dow_index = now.weekday().num_days_from_monday();
    let end_of_today = now
        .date_naive()
        .and_hms_opt(23, 59, 0)
        .unwrap()
        .and_local_timezone(tz)
        .single()
        .unwrap_or(now);
    let days_to_sunday = (6 - today_dow_index) as i64;
    let end_of_week = (now + Duration::days(days_to_sunday))
        .date_naive()
        .and_hms_opt(23, 59, 0)
        .unwrap()
        .and_local_timezone(tz)
        .single()
        .unwrap_or(now);
    let end_of_month = {
        let first_of_next_month = if now.month() == 12 {
            chrono::NaiveDate::from_ymd_opt(now.year() + 1, 1, 1)
        } else {
            chrono::NaiveDate::from_ymd_opt(now.year(), now.month() + 1, 1)
        }
        .unwrap();
        let last_day = first_of_next_month.pred_opt().unwrap();
        last_day
            .and_hms_opt(23, 59, 0)
            .unwrap()
            .and_local_timezone(tz)
            .single()
            .unwrap_or(now)
    };
    // Monday itself (`today_dow_index == 0`) must resolve to next Monday, 7
    // days out, not tomorrow: `(7 - 0) % 7 == 0`, so the zero case needs its
    // own branch rather than clamping up to 1.
    let days_to_monday = if today_dow_index == 0 {
        7
    } else {
        (7 - today_dow_index) as i64
    };
    let next_monday = (now + Duration::days(days_to_monday))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_local_timezone(tz)
        .single()
        .unwrap_or(now);

    let mut next_occurrences = [(); 7].map(|_| String::new());
    for (i, slot) in next_occurrences.iter_mut().enumerate() {
        let day = now.date_naive() + Duration::days(i as i64 + 1);
        *slot = day.format("%A %B %-d, %Y").to_string();
    }

    TemporalContext {
        now_iso: now.to_rfc3339(),
        tz: tz.to_string(),
        today_human: now.format("%A %B %-d, %Y").to_string(),
        today_dow_index,
        is_dst: is_dst(now, tz),
        end_of_today: canonical(end_of_today),
        end_of_week: canonical(end_of_week),
        end_of_month: canonical(end_of_month),
        next_monday: canonical(next_monday),
        next_occurrences,
    }
}

fn prompt(raw: &RawSlot, ctx: &TemporalContext, strict: bool) -> String {
    let reminder = if strict {
        "\nYour previous output used the wrong format or invented content. Every non-null field MUST match exactly: \"Month DD, YYYY HH:MM am|pm\"."
    } else {
        ""
    };
    format!(
        r#"Resolve relative time expressions to absolute dates using this context:
NOW_ISO: {now_iso}
TZ: {tz}
TODAY_HUMAN: {today_human}
TODAY_DOW_INDEX: {today_dow_index}
IS_DST: {is_dst}
END_OF_TODAY: {end_of_today}
END_OF_WEEK: {end_of_week}
END_OF_MONTH: {end_of_month}
NEXT_MONDAY: {next_monday}
NEXT_OCCURRENCES: {next_occurrences:?}

Resolution rules:
- "tomorrow" resolves to the calendar day after TODAY_HUMAN, at the time given in the text, else 00:00.
- "by X" where X names a weekday/date: start_text defaults to NOW_ISO, end_text is X at 23:59.
- A bare time-of-day with no day anchor resolves to today if that time is still in the future, else tomorrow.
- Never invent a duration that was not present in the input.

Input (verbatim extraction, do not invent missing fields):
start_text: {start_text:?}
end_text: {end_text:?}
duration: {duration:?}

Return ONLY a JSON object of the shape:
{{"start_text": string|null, "end_text": string|null, "duration": string|null}}
Every non-null start_text/end_text MUST be in the exact form "Month DD, YYYY HH:MM am|pm".{reminder}
Output (ONLY the JSON object):"#,
        now_iso = ctx.now_iso,
        tz = ctx.tz,
        today_human = ctx.today_human,
        today_dow_index = ctx.today_dow_index,
        is_dst = ctx.is_dst,
        end_of_today = ctx.end_of_today,
        end_of_week = ctx.end_of_week,
        end_of_month = ctx.end_of_month,
        next_monday = ctx.next_monday,
        next_occurrences = ctx.next_occurrences,
        start_text = raw.start_text,
        end_text = raw.end_text,
        duration = raw.duration,
    )
}

fn validate(slot: &AbsoluteSlot) -> Result<(), String> {
    if let Some(s) = &slot.start_text {
        if !is_canonical(s) {
            return Err(format!("start_text {s:?} is not canonical"));
        }
    }
    if let Some(e) = &slot.end_text {
        if !is_canonical(e) {
            return Err(format!("end_text {e:?} is not canonical"));
        }
    }
    Ok(())
}

pub async fn resolve(
    llm: &Arc<dyn LlmClient>,
    raw: &RawSlot,
    now: Instant,
    tz: Tz,
) -> Result<AbsoluteSlot, PipelineError> {
    let ctx = build_context(now, tz);

    for attempt in 0..2 {
        let strict = attempt == 1;
        let value = match llm.complete_json(&prompt(raw, &ctx, strict)).await {
            Ok(v) => v,
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "AR LLM call failed, retrying");
                continue;
            }
            Err(e) => {
                return Err(PipelineError::ParseLlm {
                    stage: Stage::Ar,
                    reason: e.to_string(),
                });
            }
        };

        let parsed: Result<AbsoluteSlot, _> = serde_json::from_value(value);
        match parsed {
            Ok(slot) => match validate(&slot) {
                Ok(()) => return Ok(slot),
                Err(reason) if attempt == 0 => {
                    tracing::warn!(reason, "AR output failed validation, retrying");
                    continue;
                }
                Err(reason) => return Err(PipelineError::ParseLlm { stage: Stage::Ar, reason }),
            },
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "AR output did not match schema, retrying");
                continue;
            }
            Err(e) => {
                return Err(PipelineError::ParseLlm {
                    stage: Stage::Ar,
                    reason: e.to_string(),
                });
            }
        }
    }
    unreachable!("loop always returns within two attempts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn ny() -> Tz {
        chrono_tz::America::New_York
    }

    #[test]
    fn next_monday_from_monday_is_seven_days_out_not_tomorrow() {
        // 2025-11-17 is a Monday.
        let monday = ny().with_ymd_and_hms(2025, 11, 17, 9, 0, 0).unwrap();
        let ctx = build_context(monday, ny());
        assert_eq!(ctx.next_monday, canonical(ny().with_ymd_and_hms(2025, 11, 24, 0, 0, 0).unwrap()));
    }

    #[test]
    fn next_monday_from_other_weekdays_is_still_correct() {
        // 2025-11-19 is a Wednesday; next Monday is 2025-11-24.
        let wednesday = ny().with_ymd_and_hms(2025, 11, 19, 9, 0, 0).unwrap();
        let ctx = build_context(wednesday, ny());
        assert_eq!(ctx.next_monday, canonical(ny().with_ymd_and_hms(2025, 11, 24, 0, 0, 0).unwrap()));
    }

    #[test]
    fn is_dst_true_in_july_false_in_january() {
        let july = ny().with_ymd_and_hms(2025, 7, 15, 9, 0, 0).unwrap();
        let january = ny().with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        assert!(is_dst(july, ny()));
        assert!(!is_dst(january, ny()));
    }
}

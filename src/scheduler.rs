//! Ordered even-spread greedy scheduler (spec §4.6) — the core algorithm.
//!
//! A pure function: no I/O, no clock access beyond the supplied
//! `deadline`. Everything it needs is passed in, which is what makes it
//! tractable for property-based testing (spec §9 "Scheduler as a pure
//! function").

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;

use crate::domain::Instant;
use crate::error::PipelineError;

/// A raw, possibly midnight-crossing, possibly out-of-window interval.
#[derive(Debug, Clone, Copy)]
pub struct RawInterval {
    pub start: Instant,
    pub end: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct WeeklyBlackout {
    pub weekday: chrono::Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Copy)]
pub struct DateBlackout {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub work_start_hour: u32,
    pub work_end_hour: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerConstraints {
    pub weekly_blackouts: Vec<WeeklyBlackout>,
    pub date_blackouts: Vec<DateBlackout>,
    pub min_gap_minutes: u32,
    pub max_tasks_per_day: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub task_index: usize,
    pub duration_minutes: i64,
    pub day: NaiveDate,
    pub start: Instant,
    pub end: Instant,
}

/// An interval local to a single calendar day, stripped of its date.
#[derive(Debug, Clone, Copy)]
struct DayInterval {
    day: NaiveDate,
    start_min: u32,
    end_min: u32,
}

fn minute_of_day(t: Instant) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Splits a raw interval at local midnight boundaries, clips each piece to
/// the work window, and subtracts blackouts, yielding day-local minute
/// ranges grouped by date, in order.
fn normalize(
    availability: &[RawInterval],
    tz: Tz,
    options: &SchedulerOptions,
    constraints: &SchedulerConstraints,
    deadline: Instant,
) -> BTreeMap<NaiveDate, Vec<DayInterval>> {
    let work_start = options.work_start_hour * 60;
    let work_end = options.work_end_hour * 60;

    let mut pieces: Vec<DayInterval> = Vec::new();
    for raw in availability {
        let mut cursor = raw.start;
        while cursor < raw.end {
            let day_end = cursor
                .date_naive()
                .and_hms_opt(23, 59, 59)
                .unwrap()
                .and_local_timezone(tz)
                .single()
                .unwrap_or(cursor);
            let piece_end = raw.end.min(day_end + chrono::Duration::seconds(1));
            let start_min = minute_of_day(cursor).max(work_start);
            let raw_end_min = if piece_end.date_naive() == cursor.date_naive() {
                minute_of_day(piece_end)
            } else {
                24 * 60
            };
            let end_min = raw_end_min.min(work_end);
            if start_min < end_min {
                pieces.push(DayInterval {
                    day: cursor.date_naive(),
                    start_min,
                    end_min,
                });
            }
            cursor = piece_end;
        }
    }

    for wb in &constraints.weekly_blackouts {
        pieces = pieces
            .into_iter()
            .flat_map(|p| {
                if p.day.weekday() == wb.weekday {
                    subtract_minutes(
                        p,
                        wb.start.hour() * 60 + wb.start.minute(),
                        wb.end.hour() * 60 + wb.end.minute(),
                    )
                } else {
                    vec![p]
                }
            })
            .collect();
    }
    for db in &constraints.date_blackouts {
        pieces = pieces
            .into_iter()
            .flat_map(|p| {
                if p.day == db.date {
                    subtract_minutes(
                        p,
                        db.start.hour() * 60 + db.start.minute(),
                        db.end.hour() * 60 + db.end.minute(),
                    )
                } else {
                    vec![p]
                }
            })
            .collect();
    }

    let deadline_day = deadline.date_naive();
    let deadline_minute = minute_of_day(deadline);

    let mut by_day: BTreeMap<NaiveDate, Vec<DayInterval>> = BTreeMap::new();
    for mut p in pieces {
        let day_start = tz
            .from_local_datetime_naive_day_start(p.day)
            .unwrap_or(deadline);
        if day_start > deadline {
            continue;
        }
        // Step 1 also discards anything past `deadline`: a whole day after
        // `deadline_day` is already dropped above, but on `deadline_day`
        // itself the interval must be clipped to the deadline's
        // minute-of-day, not just kept whole, or `total_have` below can
        // count minutes that no task could ever be placed in.
        if p.day == deadline_day {
            p.end_min = p.end_min.min(deadline_minute);
            if p.start_min >= p.end_min {
                continue;
            }
        }
        by_day.entry(p.day).or_default().push(p);
    }
    for v in by_day.values_mut() {
        v.sort_by_key(|p| p.start_min);
    }
    by_day
}

trait LocalDayStart {
    fn from_local_datetime_naive_day_start(&self, day: NaiveDate) -> Option<Instant>;
}

impl LocalDayStart for Tz {
    fn from_local_datetime_naive_day_start(&self, day: NaiveDate) -> Option<Instant> {
        use chrono::TimeZone;
        self.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()
    }
}

fn subtract_minutes(interval: DayInterval, cut_start: u32, cut_end: u32) -> Vec<DayInterval> {
    if cut_end <= interval.start_min || cut_start >= interval.end_min {
        return vec![interval];
    }
    let mut out = Vec::new();
    if cut_start > interval.start_min {
        out.push(DayInterval {
            day: interval.day,
            start_min: interval.start_min,
            end_min: cut_start.min(interval.end_min),
        });
    }
    if cut_end < interval.end_min {
        out.push(DayInterval {
            day: interval.day,
            start_min: cut_end.max(interval.start_min),
            end_min: interval.end_min,
        });
    }
    out
}

fn day_to_instant(day: NaiveDate, minute: u32, tz: Tz) -> Instant {
    use chrono::TimeZone;
    let naive_time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap();
    tz.from_local_datetime(&day.and_time(naive_time))
        .single()
        .unwrap_or_else(|| {
            tz.from_local_datetime(&day.and_time(naive_time))
                .earliest()
                .expect("local day/time must resolve to at least one instant")
        })
}

/// Places `durations[i]` minutes for each task `i`, in input order, onto
/// the normalized availability, per the even-spread greedy algorithm.
pub fn schedule(
    deadline: Instant,
    availability: &[RawInterval],
    durations: &[i64],
    tz: Tz,
    options: &SchedulerOptions,
    constraints: &SchedulerConstraints,
) -> Result<Vec<Assignment>, PipelineError> {
    let mut by_day = normalize(availability, tz, options, constraints, deadline);

    let total_need: i64 = durations.iter().sum();
    let total_have: i64 = by_day
        .values()
        .flatten()
        .map(|p| (p.end_min - p.start_min) as i64)
        .sum();
    if total_need > total_have {
        return Err(PipelineError::SchedInfeasibleTotal {
            need: total_need,
            have: total_have,
        });
    }

    let days: Vec<NaiveDate> = by_day.keys().copied().collect();
    let day_count = days.len();
    let n = durations.len();

    let mut placed_on_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut last_end_on_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut assignments = Vec::with_capacity(n);

    for (i, &duration) in durations.iter().enumerate() {
        let target_index = if n > 1 {
            ((i as f64) * ((day_count.saturating_sub(1)) as f64) / ((n - 1) as f64)).round() as i64
        } else {
            0
        };

        let mut candidates: Vec<(usize, NaiveDate)> = days.iter().copied().enumerate().collect();
        candidates.sort_by_key(|(idx, day)| {
            let dist = (*idx as i64 - target_index).abs();
            let load = *placed_on_day.get(day).unwrap_or(&0);
            (dist, load, *idx as i64)
        });

        let mut placed = false;
        for (_, day) in &candidates {
            if let Some(max) = constraints.max_tasks_per_day {
                if *placed_on_day.get(day).unwrap_or(&0) >= max {
                    continue;
                }
            }
            let min_start = last_end_on_day
                .get(day)
                .map(|&e| e + constraints.min_gap_minutes)
                .unwrap_or(0);

            let slots = by_day.get(day).cloned().unwrap_or_default();
            let mut chosen = None;
            for slot in &slots {
                let candidate_start = slot.start_min.max(min_start);
                let candidate_end = candidate_start + duration as u32;
                if candidate_end <= slot.end_min {
                    let end_instant = day_to_instant(*day, candidate_end, tz);
                    if end_instant <= deadline {
                        chosen = Some((candidate_start, candidate_end));
                        break;
                    }
                }
            }

            if let Some((start_min, end_min)) = chosen {
                let start = day_to_instant(*day, start_min, tz);
                let end = day_to_instant(*day, end_min, tz);
                assignments.push(Assignment {
                    task_index: i,
                    duration_minutes: duration,
                    day: *day,
                    start,
                    end,
                });

                let cut_end = end_min + constraints.min_gap_minutes;
                let remaining: Vec<DayInterval> = slots
                    .into_iter()
                    .flat_map(|s| subtract_minutes(s, start_min, cut_end))
                    .collect();
                by_day.insert(*day, remaining);
                *placed_on_day.entry(*day).or_insert(0) += 1;
                last_end_on_day.insert(*day, end_min);
                placed = true;
                break;
            }
        }

        if !placed {
            return Err(PipelineError::SchedInfeasibleLocal { task_index: i });
        }
    }

    Ok(assignments)
}

//! Allotter (TA) — spec §4.7.
//!
//! Adapts pipeline output to the scheduler's input shape, derives free
//! availability from the backend's busy intervals, invokes the scheduler,
//! then re-validates every returned slot against the invariants the
//! scheduler is expected to guarantee (a validation failure here indicates
//! a scheduler bug or stale availability, not a query-level error).

use std::sync::Arc;

use chrono_tz::Tz;
use uuid::Uuid;

use crate::backend::CalendarBackend;
use crate::domain::{
    ClassifiedTask, DecomposedTask, Instant, ScheduledSubtask, ScheduledTask, Slot, StandardWindow,
};
use crate::error::PipelineError;
use crate::scheduler::{self, Assignment, RawInterval, SchedulerConstraints, SchedulerOptions};

/// Fetches backend events in `[window.start, window.end]`, excludes the
/// configured holidays calendar, and returns the complement within the
/// work window as raw (possibly midnight-crossing) free intervals.
pub async fn free_intervals(
    backend: &Arc<dyn CalendarBackend>,
    window: &StandardWindow,
    tz: Tz,
    holidays_calendar_title: &str,
) -> Result<Vec<RawInterval>, PipelineError> {
    let days = (window.end - window.start).num_days().max(1) as u32 + 1;
    let events = backend
        .events(days, None, false, tz)
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    let mut busy: Vec<(Instant, Instant)> = events
        .into_iter()
        .filter(|e| !e.calendar_title.eq_ignore_ascii_case(holidays_calendar_title))
        .map(|e| (e.start, e.end))
        .filter(|(s, e)| *e > window.start && *s < window.end)
        .collect();
    busy.sort_by_key(|(s, _)| *s);

    let mut free = Vec::new();
    let mut cursor = window.start;
    for (busy_start, busy_end) in busy {
        if busy_start > cursor {
            free.push(RawInterval { start: cursor, end: busy_start.min(window.end) });
        }
        if busy_end > cursor {
            cursor = busy_end;
        }
    }
    if cursor < window.end {
        free.push(RawInterval { start: cursor, end: window.end });
    }
    Ok(free)
}

fn validate_slot_in_window(slot: Slot, window: &StandardWindow) -> Result<(), PipelineError> {
    if slot.start < window.start || slot.end > window.end {
        return Err(PipelineError::TaValidation(format!(
            "slot {}..{} falls outside window {}..{}",
            slot.start, slot.end, window.start, window.end
        )));
    }
    Ok(())
}

fn assignment_to_slot(a: &Assignment) -> Slot {
    Slot { start: a.start, end: a.end }
}

/// Simple-path scheduling: one task, one duration, availability clipped to
/// the standardized window and assigned calendar.
pub async fn allot_simple(
    backend: &Arc<dyn CalendarBackend>,
    classified: &ClassifiedTask,
    window: &StandardWindow,
    tz: Tz,
    options: &SchedulerOptions,
    constraints: &SchedulerConstraints,
    holidays_calendar_title: &str,
) -> Result<ScheduledTask, PipelineError> {
    let duration = classified
        .duration
        .ok_or_else(|| PipelineError::TaValidation("simple task has no duration".to_string()))?;

    let availability = free_intervals(backend, window, tz, holidays_calendar_title).await?;
    let assignments = scheduler::schedule(
        window.end,
        &availability,
        &[duration.num_minutes()],
        tz,
        options,
        constraints,
    )?;
    let assignment = assignments
        .first()
        .ok_or_else(|| PipelineError::TaValidation("scheduler returned no assignment".to_string()))?;

    let slot = assignment_to_slot(assignment);
    validate_slot_in_window(slot, window)?;
    if (slot.end - slot.start) != duration.0 {
        return Err(PipelineError::TaValidation(format!(
            "slot duration {} does not match declared duration {}",
            (slot.end - slot.start).num_minutes(),
            duration.num_minutes()
        )));
    }

    Ok(ScheduledTask::Simple {
        calendar_id: classified.calendar_id.clone(),
        title: classified.title.clone(),
        slot,
        id: Uuid::new_v4(),
    })
}

/// Complex-path scheduling: one assignment per subtask, parent gets a new
/// id, children ordered by assigned start (which the scheduler guarantees
/// already matches input order).
pub async fn allot_complex(
    backend: &Arc<dyn CalendarBackend>,
    decomposed: &DecomposedTask,
    window: &StandardWindow,
    tz: Tz,
    options: &SchedulerOptions,
    constraints: &SchedulerConstraints,
    holidays_calendar_title: &str,
) -> Result<ScheduledTask, PipelineError> {
    let durations: Vec<i64> = decomposed.subtasks.iter().map(|s| s.duration.num_minutes()).collect();
    let availability = free_intervals(backend, window, tz, holidays_calendar_title).await?;
    let assignments = scheduler::schedule(window.end, &availability, &durations, tz, options, constraints)?;

    if assignments.len() != decomposed.subtasks.len() {
        return Err(PipelineError::TaValidation(
            "scheduler returned a different number of assignments than subtasks".to_string(),
        ));
    }

    let parent_id = Uuid::new_v4();
    let mut children = Vec::with_capacity(assignments.len());
    let mut prev_end: Option<Instant> = None;
    for (spec, assignment) in decomposed.subtasks.iter().zip(assignments.iter()) {
        let slot = assignment_to_slot(assignment);
        validate_slot_in_window(slot, window)?;
        if (slot.end - slot.start) != spec.duration.0 {
            return Err(PipelineError::TaValidation(format!(
                "subtask {:?} slot duration does not match declared duration",
                spec.title
            )));
        }
        if let Some(prev) = prev_end {
            if slot.start < prev {
                return Err(PipelineError::TaValidation(
                    "subtasks are not strictly ordered by start time".to_string(),
                ));
            }
        }
        prev_end = Some(slot.end);
        children.push(ScheduledSubtask {
            title: spec.title.clone(),
            slot,
            id: Uuid::new_v4(),
            parent_id,
        });
    }

    Ok(ScheduledTask::Complex {
        calendar_id: decomposed.classified.calendar_id.clone(),
        title: decomposed.classified.title.clone(),
        id: parent_id,
        subtasks: children,
    })
}

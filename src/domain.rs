//! Shared data model for the time-understanding pipeline and scheduler.
//!
//! Types mirror the stage boundaries of the pipeline: each stage consumes
//! one of these and produces the next, so a stage's output type doubles as
//! the next stage's input contract.

use chrono::{DateTime, Duration as ChronoDuration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A free-form utterance plus the zone it should be interpreted in.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub tz: Tz,
}

impl Query {
    pub fn new(text: impl Into<String>, tz: Tz) -> Self {
        Self { text: text.into(), tz }
    }
}

/// A zone-aware instant, used everywhere spec.md says `OffsetDateTime`.
pub type Instant = DateTime<Tz>;

/// `PT#H#M#S` duration, parsed from several accepted textual forms and
/// always re-emitted in canonical ISO-8601 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IsoDuration(pub ChronoDuration);

impl IsoDuration {
    pub fn minutes(m: i64) -> Self {
        Self(ChronoDuration::minutes(m))
    }

    pub fn num_minutes(&self) -> i64 {
        self.0.num_minutes()
    }

    pub fn to_iso8601(&self) -> String {
        let total_secs = self.0.num_seconds().max(0);
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        if hours == 0 && minutes == 0 && seconds == 0 {
            return "PT0S".to_string();
        }
        let mut s = String::from("PT");
        if hours > 0 {
            s.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            s.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            s.push_str(&format!("{seconds}S"));
        }
        s
    }
}

impl Serialize for IsoDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for IsoDuration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::pipeline::time_standardizer::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// SE output: verbatim extracted substrings, before any resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSlot {
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub duration: Option<String>,
}

impl RawSlot {
    pub fn is_empty(&self) -> bool {
        self.start_text.is_none() && self.end_text.is_none() && self.duration.is_none()
    }
}

/// AR output: every non-null field resolved to the canonical
/// `"Month DD, YYYY HH:MM am|pm"` form (durations stay as free text, parsed
/// downstream by TS).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbsoluteSlot {
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub duration: Option<String>,
}

/// TS output: the fully resolved, zone-attached scheduling window.
#[derive(Debug, Clone)]
pub struct StandardWindow {
    pub start: Instant,
    pub end: Instant,
    pub duration: Option<IsoDuration>,
}

/// TD output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Simple,
    Complex,
}

#[derive(Debug, Clone)]
pub struct ClassifiedTask {
    pub calendar_id: String,
    pub kind: TaskKind,
    pub title: String,
    pub duration: Option<IsoDuration>,
}

/// LD output: one ordered subtask description, each at most `PT3H`.
#[derive(Debug, Clone)]
pub struct SubtaskSpec {
    pub title: String,
    pub duration: IsoDuration,
}

#[derive(Debug, Clone)]
pub struct DecomposedTask {
    pub classified: ClassifiedTask,
    pub subtasks: Vec<SubtaskSpec>,
}

/// A concrete placed interval.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub start: Instant,
    pub end: Instant,
}

/// TA/Scheduler output: one scheduled task, simple or decomposed.
#[derive(Debug, Clone)]
pub enum ScheduledTask {
    Simple {
        calendar_id: String,
        title: String,
        slot: Slot,
        id: Uuid,
    },
    Complex {
        calendar_id: String,
        title: String,
        id: Uuid,
        subtasks: Vec<ScheduledSubtask>,
    },
}

#[derive(Debug, Clone)]
pub struct ScheduledSubtask {
    pub title: String,
    pub slot: Slot,
    pub id: Uuid,
    pub parent_id: Uuid,
}

impl ScheduledTask {
    pub fn id(&self) -> Uuid {
        match self {
            ScheduledTask::Simple { id, .. } => *id,
            ScheduledTask::Complex { id, .. } => *id,
        }
    }
}

/// Persisted row mirroring the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTask {
    pub id: Uuid,
    pub title: String,
    pub parent_id: Option<Uuid>,
}

/// Persisted row mirroring the `event_map` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMapping {
    pub task_id: Uuid,
    pub backend_event_id: String,
    pub calendar_id: String,
}

/// A calendar from the backend's catalog (`GET /calendars`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub writable: bool,
}

/// An existing event read back from the backend (`GET /events`).
#[derive(Debug, Clone)]
pub struct BackendEvent {
    pub id: String,
    pub title: String,
    pub start: Instant,
    pub end: Instant,
    pub calendar_id: String,
    pub calendar_title: String,
}

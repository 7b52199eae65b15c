//! Orchestrator — spec §4.9. Wires UQ→SE→AR→TS→TD→(LD)→TA→EC, recording a
//! per-stage trace so a caller can render progress and errors the same way
//! whether the run succeeds, fails partway, or partially commits.

use std::sync::Arc;

use serde::Serialize;

use crate::allotter;
use crate::backend::CalendarBackend;
use crate::config::Config;
use crate::domain::{Instant, Query, ScheduledTask};
use crate::error::{PipelineError, Stage};
use crate::event_creator;
use crate::llm::LlmClient;
use crate::pipeline::{absolute_resolver, decomposer, difficulty_analyzer, slot_extractor, time_standardizer};
use crate::scheduler::{SchedulerConstraints, SchedulerOptions};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Ok,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub stages: Vec<StageRecord>,
    pub exit_code: i32,
}

impl Trace {
    fn new() -> Self {
        Self { stages: Vec::new(), exit_code: 0 }
    }

    fn record_ok(&mut self, stage: Stage, detail: impl Into<String>) {
        self.stages.push(StageRecord { stage, status: StageStatus::Ok, detail: Some(detail.into()) });
    }

    fn record_skipped(&mut self, stage: Stage) {
        self.stages.push(StageRecord { stage, status: StageStatus::Skipped, detail: None });
    }

    fn record_error(&mut self, err: &PipelineError) {
        self.exit_code = err.exit_code();
        self.stages.push(StageRecord {
            stage: err.stage(),
            status: StageStatus::Error,
            detail: Some(err.to_string()),
        });
    }

    pub fn render_human(&self) -> String {
        let mut out = String::new();
        for record in &self.stages {
            let marker = match record.status {
                StageStatus::Ok => "ok",
                StageStatus::Skipped => "skipped",
                StageStatus::Error => "ERROR",
                StageStatus::Pending => "pending",
            };
            out.push_str(&format!("[{:>10}] {marker}", record.stage.to_string()));
            if let Some(detail) = &record.detail {
                out.push_str(&format!(" — {detail}"));
            }
            out.push('\n');
        }
        out
    }

    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub struct Orchestrator {
    pub llm: Arc<dyn LlmClient>,
    pub backend: Arc<dyn CalendarBackend>,
    pub store: Store,
    pub config: Config,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        backend: Arc<dyn CalendarBackend>,
        store: Store,
        config: Config,
    ) -> Self {
        Self { llm, backend, store, config }
    }

    /// Runs one query through the full pipeline, returning the committed
    /// `ScheduledTask` (if EC got far enough to create one) and the trace.
    pub async fn run(&self, query: Query, now: Instant) -> (Option<ScheduledTask>, Trace) {
        let mut trace = Trace::new();

        let raw = match slot_extractor::extract(&self.llm, &query.text).await {
            Ok(raw) => {
                trace.record_ok(Stage::Se, format!("{raw:?}"));
                raw
            }
            Err(e) => {
                trace.record_error(&e);
                return (None, trace);
            }
        };

        let absolute = match absolute_resolver::resolve(&self.llm, &raw, now, query.tz).await {
            Ok(abs) => {
                trace.record_ok(Stage::Ar, format!("{abs:?}"));
                abs
            }
            Err(e) => {
                trace.record_error(&e);
                return (None, trace);
            }
        };

        let window = match time_standardizer::standardize(&absolute, query.tz, now) {
            Ok(w) => {
                trace.record_ok(Stage::Ts, format!("{}..{}", w.start, w.end));
                w
            }
            Err(e) => {
                trace.record_error(&e);
                return (None, trace);
            }
        };

        let calendars = match self.backend.calendars().await {
            Ok(cals) => cals,
            Err(e) => {
                let err = PipelineError::BackendUnavailable(e.to_string());
                trace.record_error(&err);
                return (None, trace);
            }
        };

        let classified = match difficulty_analyzer::classify(
            &self.llm,
            &query.text,
            window.duration,
            &calendars,
        )
        .await
        {
            Ok(c) => {
                trace.record_ok(Stage::Td, format!("{:?} -> {}", c.kind, c.title));
                c
            }
            Err(e) => {
                trace.record_error(&e);
                return (None, trace);
            }
        };

        let options = SchedulerOptions {
            work_start_hour: self.config.work_start_hour,
            work_end_hour: self.config.work_end_hour,
        };
        let constraints = SchedulerConstraints {
            weekly_blackouts: Vec::new(),
            date_blackouts: Vec::new(),
            min_gap_minutes: self.config.min_gap_minutes,
            max_tasks_per_day: self.config.max_tasks_per_day,
        };

        let scheduled = match classified.kind {
            crate::domain::TaskKind::Simple => {
                trace.record_skipped(Stage::Ld);
                match allotter::allot_simple(
                    &self.backend,
                    &classified,
                    &window,
                    query.tz,
                    &options,
                    &constraints,
                    &self.config.holidays_calendar_title,
                )
                .await
                {
                    Ok(scheduled) => {
                        trace.record_ok(Stage::Ta, "placed simple task");
                        scheduled
                    }
                    Err(e) => {
                        trace.record_error(&e);
                        return (None, trace);
                    }
                }
            }
            crate::domain::TaskKind::Complex => {
                let decomposed = match decomposer::decompose(&self.llm, &classified).await {
                    Ok(d) => {
                        trace.record_ok(Stage::Ld, format!("{} subtasks", d.subtasks.len()));
                        d
                    }
                    Err(e) => {
                        trace.record_error(&e);
                        return (None, trace);
                    }
                };
                match allotter::allot_complex(
                    &self.backend,
                    &decomposed,
                    &window,
                    query.tz,
                    &options,
                    &constraints,
                    &self.config.holidays_calendar_title,
                )
                .await
                {
                    Ok(scheduled) => {
                        trace.record_ok(Stage::Ta, "placed complex task");
                        scheduled
                    }
                    Err(e) => {
                        trace.record_error(&e);
                        return (None, trace);
                    }
                }
            }
        };

        match event_creator::commit(&self.backend, &self.store, &scheduled).await {
            Ok(result) if result.failures.is_empty() => {
                trace.record_ok(
                    Stage::Ec,
                    format!("{}/{} events created", result.created_backend_events, result.total_backend_events),
                );
                (Some(scheduled), trace)
            }
            Ok(result) => {
                let err = PipelineError::EcPartial {
                    succeeded: result.created_backend_events,
                    total: result.total_backend_events,
                    failures: result.failures,
                };
                trace.record_error(&err);
                (Some(scheduled), trace)
            }
            Err(e) => {
                trace.record_error(&e);
                (None, trace)
            }
        }
    }
}

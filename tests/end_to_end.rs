//! End-to-end pipeline scenarios (spec §8 S1-S6), exercised against
//! hand-written fakes for the LLM and calendar backend rather than HTTP
//! mocking — the capability traits exist precisely so this is possible.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calscribe::backend::{AddEventRequest, AddEventResponse, BackendError, CalendarBackend};
use calscribe::config::Config;
use calscribe::domain::{BackendEvent, CalendarInfo, Query};
use calscribe::llm::{LlmClient, LlmError};
use calscribe::orchestrator::Orchestrator;
use calscribe::store::Store;
use chrono_tz::Tz;
use serde_json::json;

/// Replays a fixed sequence of JSON responses, one per `complete_json`
/// call, cycling to the last response if more calls happen than fixtures
/// (covers the pipeline's one-retry paths without needing per-test wiring).
struct ScriptedLlm {
    responses: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<serde_json::Value>) -> Self {
        Self { responses: Mutex::new(responses) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_json(&self, _prompt: &str) -> Result<serde_json::Value, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Request("no more scripted responses".to_string()));
        }
        if responses.len() == 1 {
            Ok(responses[0].clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

struct FakeBackend {
    calendars: Vec<CalendarInfo>,
    events: Mutex<Vec<BackendEvent>>,
    added: Mutex<Vec<AddEventRequest>>,
    reject_nth_add: Option<usize>,
}

impl FakeBackend {
    fn new(calendars: Vec<CalendarInfo>) -> Self {
        Self {
            calendars,
            events: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
            reject_nth_add: None,
        }
    }
}

#[async_trait]
impl CalendarBackend for FakeBackend {
    async fn status(&self) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn calendars(&self) -> Result<Vec<CalendarInfo>, BackendError> {
        Ok(self.calendars.clone())
    }

    async fn events(
        &self,
        _days: u32,
        _calendar_id: Option<&str>,
        _exclude_holidays: bool,
        _tz: Tz,
    ) -> Result<Vec<BackendEvent>, BackendError> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn add(&self, req: AddEventRequest) -> Result<AddEventResponse, BackendError> {
        let mut added = self.added.lock().unwrap();
        let index = added.len();
        added.push(req);
        if let Some(n) = self.reject_nth_add {
            if index == n {
                return Err(BackendError::Rejected("simulated rejection".to_string()));
            }
        }
        Ok(AddEventResponse { id: format!("evt-{index}") })
    }

    async fn delete(&self, _event_id: &str) -> Result<bool, BackendError> {
        Ok(true)
    }
}

fn home_and_work_calendars() -> Vec<CalendarInfo> {
    vec![
        CalendarInfo { id: "home-id".to_string(), title: "Home".to_string(), writable: true },
        CalendarInfo { id: "work-id".to_string(), title: "Work".to_string(), writable: true },
    ]
}

fn test_config(tmp_path: &str) -> Config {
    let mut config = Config::default();
    config.db_path = tmp_path.into();
    config
}

#[tokio::test]
async fn s1_simple_task_with_explicit_time_commits_one_event() {
    let db_path = format!("file:s1_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": "tomorrow at 10am", "end_text": null, "duration": "45 minutes"}),
        json!({"start_text": "November 19, 2025 10:00 am", "end_text": null, "duration": "45 minutes"}),
        json!({"atomic": true, "calendar_title": "Home", "title": "Call dentist"}),
    ])) as Arc<dyn LlmClient>;
    let fake_backend = Arc::new(FakeBackend::new(home_and_work_calendars()));
    let backend = fake_backend.clone() as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 18, 0, 0, 0)
        .unwrap();
    use chrono::TimeZone;
    let query = Query::new("Call dentist tomorrow at 10am for 45 minutes", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;

    assert_eq!(trace.exit_code, 0, "trace: {}", trace.render_human());
    let expected_start = chrono_tz::America::New_York.with_ymd_and_hms(2025, 11, 19, 10, 0, 0).unwrap();
    let expected_end = chrono_tz::America::New_York.with_ymd_and_hms(2025, 11, 19, 10, 45, 0).unwrap();
    match scheduled.expect("a simple task should have been scheduled") {
        calscribe::domain::ScheduledTask::Simple { calendar_id, slot, id, .. } => {
            assert_eq!(calendar_id, "home-id");
            assert_eq!(slot.start, expected_start);
            assert_eq!(slot.end, expected_end);

            let added = fake_backend.added.lock().unwrap();
            assert_eq!(added.len(), 1, "exactly one backend event must be created");
            let event = &added[0];
            assert_eq!(event.calendar_id, "home-id");
            assert_eq!(event.start, expected_start);
            assert_eq!(event.end, expected_end);
            assert_eq!(event.notes.as_deref(), Some(format!("id: {id}, parent_id: null").as_str()));
        }
        other => panic!("expected a simple task, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_no_time_info_defaults_to_thirty_minutes() {
    let db_path = format!("file:s3_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": null, "end_text": null, "duration": null}),
        json!({"start_text": null, "end_text": null, "duration": null}),
        json!({"start_text": null, "end_text": null, "duration": null}),
        json!({"atomic": true, "calendar_title": "Home", "title": "Call mom"}),
    ])) as Arc<dyn LlmClient>;
    let backend = Arc::new(FakeBackend::new(home_and_work_calendars())) as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());
    use chrono::TimeZone;
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 19, 14, 0, 0)
        .unwrap();
    let query = Query::new("Call mom", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;

    // SE finds no temporal expression at all (retries once, still empty) and
    // passes an empty slot onward; AR likewise resolves nothing; TS falls
    // back to a `[now, now+2d]` search window; TD has no duration to work
    // with but judges the task atomic, so it defaults to PT30M (spec §4.4).
    assert_eq!(trace.exit_code, 0, "trace: {}", trace.render_human());
    let window_end = now + chrono::Duration::days(2);
    match scheduled.expect("a simple task should have been scheduled") {
        calscribe::domain::ScheduledTask::Simple { slot, .. } => {
            assert_eq!((slot.end - slot.start).num_minutes(), 30);
            assert!(slot.start >= now, "slot must not start before now");
            assert!(slot.end <= window_end, "slot must stay within [now, now+2d]");
            // With no competing busy time, the earliest free 30-minute
            // window today is `now` itself (14:00 is already inside the
            // work window, so nothing pushes it out to tomorrow).
            assert_eq!(slot.start, now);
            assert_eq!(slot.end, now + chrono::Duration::minutes(30));
        }
        other => panic!("expected a simple task, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_partial_ec_failure_reports_created_and_failed_counts() {
    let db_path = format!("file:s6_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": null, "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"start_text": "November 18, 2025 01:08 am", "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"atomic": false, "calendar_title": "Home", "title": "Plan Japan trip"}),
        json!([
            {"title": "Book flights (Japan trip)", "duration": "PT1H"},
            {"title": "Reserve hotels (Japan trip)", "duration": "PT2H"},
        ]),
    ])) as Arc<dyn LlmClient>;
    let mut backend = FakeBackend::new(home_and_work_calendars());
    backend.reject_nth_add = Some(1);
    let fake_backend = Arc::new(backend);
    let backend = fake_backend.clone() as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());
    use chrono::TimeZone;
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 18, 1, 8, 55)
        .unwrap();
    let query = Query::new("Plan a 5-day Japan trip by Nov 25", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;

    // Both subtask POSTs are attempted (the first succeeds, the second is
    // rejected by the fake) — a partial failure must not short-circuit the
    // remaining children.
    assert_eq!(fake_backend.added.lock().unwrap().len(), 2);
    assert_eq!(trace.exit_code, 0, "trace: {}", trace.render_human());
    let ec_record = trace
        .stages
        .iter()
        .find(|r| r.stage == calscribe::error::Stage::Ec)
        .expect("EC stage must appear in the trace");
    assert_eq!(ec_record.status, calscribe::orchestrator::StageStatus::Error);
    assert_eq!(
        ec_record.detail.as_deref(),
        Some("EC stage: 1/2 events created, 1 failed")
    );
    assert!(scheduled.is_some(), "the two subtasks still got scheduled even though EC partially failed");
}

#[tokio::test]
async fn s2_complex_trip_spreads_five_subtasks_across_distinct_days() {
    let db_path = format!("file:s2_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": null, "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"start_text": "November 18, 2025 01:08 am", "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"atomic": false, "calendar_title": "Home", "title": "Plan Japan trip"}),
        json!([
            {"title": "Book flights (Japan trip)", "duration": "PT1H"},
            {"title": "Reserve hotels (Japan trip)", "duration": "PT2H"},
            {"title": "Build itinerary (Japan trip)", "duration": "PT1H30M"},
            {"title": "Arrange transit passes (Japan trip)", "duration": "PT2H"},
            {"title": "Pack and confirm documents (Japan trip)", "duration": "PT45M"},
        ]),
    ])) as Arc<dyn LlmClient>;
    let backend = Arc::new(FakeBackend::new(home_and_work_calendars())) as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());
    use chrono::TimeZone;
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 18, 1, 8, 55)
        .unwrap();
    let query = Query::new("Plan a 5-day Japan trip by Nov 25", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;

    assert_eq!(trace.exit_code, 0, "trace: {}", trace.render_human());
    match scheduled.expect("a complex task should have been scheduled") {
        calscribe::domain::ScheduledTask::Complex { subtasks, .. } => {
            assert_eq!(subtasks.len(), 5);
            let distinct_days: std::collections::HashSet<_> =
                subtasks.iter().map(|s| s.slot.start.date_naive()).collect();
            assert_eq!(distinct_days.len(), 5, "each subtask should land on its own day");
            for w in subtasks.windows(2) {
                assert!(w[0].slot.start < w[1].slot.start, "subtasks must stay in input order");
                assert!(w[0].slot.end <= w[1].slot.start, "subtasks must not overlap");
            }
            let parent_id = subtasks[0].parent_id;
            assert!(subtasks.iter().all(|s| s.parent_id == parent_id));
        }
        other => panic!("expected a complex task, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_infeasible_total_time_reports_need_and_have_with_no_side_effects() {
    let db_path = format!("file:s4_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    // A 2-hour task whose only candidate window (2pm-4pm) is already fully
    // booked on the backend: total need (120m) exceeds total have (0m)
    // once busy time is subtracted, so the scheduler must reject before
    // any backend POST.
    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": "2pm", "end_text": "4pm", "duration": null}),
        json!({"start_text": "November 18, 2025 02:00 pm", "end_text": "November 18, 2025 04:00 pm", "duration": "2 hours"}),
        json!({"atomic": false, "calendar_title": "Work", "title": "Write report"}),
    ])) as Arc<dyn LlmClient>;
    let fake_backend = Arc::new(FakeBackend::new(home_and_work_calendars()));
    use chrono::TimeZone;
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 18, 10, 0, 0)
        .unwrap();
    fake_backend.events.lock().unwrap().push(BackendEvent {
        id: "busy-1".to_string(),
        title: "Existing meeting".to_string(),
        start: chrono_tz::America::New_York.with_ymd_and_hms(2025, 11, 18, 14, 0, 0).unwrap(),
        end: chrono_tz::America::New_York.with_ymd_and_hms(2025, 11, 18, 16, 0, 0).unwrap(),
        calendar_id: "work-id".to_string(),
        calendar_title: "Work".to_string(),
    });
    let backend = fake_backend.clone() as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());
    let query = Query::new("Write the report from 2pm to 4pm, 2 hours", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;

    assert!(scheduled.is_none());
    assert_eq!(trace.exit_code, 2, "trace: {}", trace.render_human());
    assert!(
        fake_backend.added.lock().unwrap().is_empty(),
        "infeasible query must not reach EC"
    );
}

#[tokio::test]
async fn s5_cascade_delete_removes_parent_and_all_children() {
    let db_path = format!("file:s5_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let config = test_config(&db_path);
    let store = Store::connect(&db_path).await.expect("store connects");

    let llm = Arc::new(ScriptedLlm::new(vec![
        json!({"start_text": null, "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"start_text": "November 18, 2025 01:08 am", "end_text": "November 25, 2025 11:59 pm", "duration": null}),
        json!({"atomic": false, "calendar_title": "Home", "title": "Plan Japan trip"}),
        json!([
            {"title": "Book flights (Japan trip)", "duration": "PT1H"},
            {"title": "Reserve hotels (Japan trip)", "duration": "PT2H"},
            {"title": "Build itinerary (Japan trip)", "duration": "PT1H30M"},
            {"title": "Arrange transit passes (Japan trip)", "duration": "PT2H"},
            {"title": "Pack and confirm documents (Japan trip)", "duration": "PT45M"},
        ]),
    ])) as Arc<dyn LlmClient>;
    let backend = Arc::new(FakeBackend::new(home_and_work_calendars())) as Arc<dyn CalendarBackend>;

    let orchestrator = Orchestrator::new(llm, backend.clone(), store, config.clone());
    use chrono::TimeZone;
    let now = chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 11, 18, 1, 8, 55)
        .unwrap();
    let query = Query::new("Plan a 5-day Japan trip by Nov 25", config.timezone);
    let (scheduled, trace) = orchestrator.run(query, now).await;
    assert_eq!(trace.exit_code, 0, "trace: {}", trace.render_human());
    let parent_id = scheduled.expect("complex task committed").id();

    let store = Store::connect(&db_path).await.expect("store reconnects to the same db");
    let deleted = calscribe::event_creator::delete_by_task_id(&backend, &store, parent_id)
        .await
        .expect("cascade delete succeeds");
    assert_eq!(deleted, 5, "5 backend events deleted; the parent itself never had one");
    assert!(
        store.list_tasks().await.unwrap().is_empty(),
        "all 6 rows (parent + 5 children) must still be gone from the DB"
    );
}

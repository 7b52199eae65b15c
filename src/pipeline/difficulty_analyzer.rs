//! DifficultyAnalyzer (TD) — spec §4.4.
//!
//! Combines an LLM judgment (atomicity, calendar affinity, a short title)
//! with a deterministic decision table applied in Rust — only the
//! atomicity/calendar/title inputs come from the model, the `simple` vs
//! `complex` outcome itself is computed here, not asked of the LLM.

use std::sync::Arc;

use crate::domain::{CalendarInfo, ClassifiedTask, IsoDuration, TaskKind};
use crate::error::{PipelineError, Stage};
use crate::llm::LlmClient;

const DEFAULT_ATOMIC_DURATION: IsoDuration = IsoDuration(chrono::Duration::minutes(30));

#[derive(Debug, serde::Deserialize)]
struct Judgment {
    atomic: bool,
    calendar_title: String,
    title: String,
}

fn prompt(query_text: &str, calendars: &[CalendarInfo], strict: bool) -> String {
    let reminder = if strict {
        "\nYour previous output was not valid JSON matching the schema. Respond with ONLY the JSON object."
    } else {
        ""
    };
    let titles: Vec<&str> = calendars
        .iter()
        .filter(|c| c.writable)
        .map(|c| c.title.as_str())
        .collect();
    format!(
        r#"Judge the task named in this query: "{query_text}"

Is it atomic — a single action (one phone call, one email) — or does it require multiple distinct steps (a trip, a launch, a multi-part plan)?

Available writable calendars: {titles:?}
Pick "Work" for professional/work vocabulary, "Home" otherwise, matching one of the available calendar titles exactly.

Produce a short imperative title for the task, at most 40 characters.

Return ONLY a JSON object of the shape:
{{"atomic": bool, "calendar_title": string, "title": string}}{reminder}
Output (ONLY the JSON object):"#
    )
}

pub async fn classify(
    llm: &Arc<dyn LlmClient>,
    query_text: &str,
    duration: Option<IsoDuration>,
    calendars: &[CalendarInfo],
) -> Result<ClassifiedTask, PipelineError> {
    let judgment = request_judgment(llm, query_text, calendars).await?;

    let calendar_id = calendars
        .iter()
        .find(|c| c.writable && c.title.eq_ignore_ascii_case(&judgment.calendar_title))
        .map(|c| c.id.clone())
        .ok_or(PipelineError::TdNoCal)?;

    let (kind, resolved_duration) = match (duration, judgment.atomic) {
        (Some(d), _) => (TaskKind::Simple, Some(d)),
        (None, true) => (TaskKind::Simple, Some(DEFAULT_ATOMIC_DURATION)),
        (None, false) => (TaskKind::Complex, None),
    };

    Ok(ClassifiedTask {
        calendar_id,
        kind,
        title: judgment.title,
        duration: resolved_duration,
    })
}

async fn request_judgment(
    llm: &Arc<dyn LlmClient>,
    query_text: &str,
    calendars: &[CalendarInfo],
) -> Result<Judgment, PipelineError> {
    for attempt in 0..2 {
        let strict = attempt == 1;
        let value = match llm.complete_json(&prompt(query_text, calendars, strict)).await {
            Ok(v) => v,
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "TD LLM call failed, retrying");
                continue;
            }
            Err(e) => {
                return Err(PipelineError::ParseLlm {
                    stage: Stage::Td,
                    reason: e.to_string(),
                });
            }
        };

        match serde_json::from_value::<Judgment>(value) {
            Ok(j) => return Ok(j),
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "TD output did not match schema, retrying");
                continue;
            }
            Err(e) => {
                return Err(PipelineError::ParseLlm {
                    stage: Stage::Td,
                    reason: e.to_string(),
                });
            }
        }
    }
    unreachable!("loop always returns within two attempts")
}

//! Decomposer (LD) — spec §4.5.
//!
//! For complex tasks, asks the LLM for 2-5 ordered subtasks, each capped
//! at `PT3H`, titles tagged with a parenthesized context derived from the
//! parent title. Violations of count/duration/order retry once with a
//! tightened prompt, then fail `LD_INVALID`.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use crate::domain::{ClassifiedTask, DecomposedTask, IsoDuration, SubtaskSpec};
use crate::error::PipelineError;
use crate::llm::LlmClient;
use crate::pipeline::time_standardizer::parse_duration;

const MAX_SUBTASK_DURATION: ChronoDuration = ChronoDuration::hours(3);

#[derive(Debug, serde::Deserialize)]
struct RawSubtask {
    title: String,
    duration: String,
}

fn prompt(parent: &ClassifiedTask, strict: bool) -> String {
    let reminder = if strict {
        "\nYour previous output violated the constraints (wrong subtask count, a duration over 3 hours, or a malformed duration). Fix this and respond with ONLY the JSON array."
    } else {
        ""
    };
    format!(
        r#"Break the following task into an ordered sequence of concrete subtasks:

Task: "{title}"

Constraints:
- Produce between 2 and 5 subtasks, inclusive.
- Each subtask's duration must be at most 3 hours (PT3H), expressed as ISO-8601 (e.g. "PT1H30M") or "N minutes"/"N hours".
- Order subtasks so execution is sequentially sensible (each depends on the one before it).
- Suffix each subtask's title with a parenthesized context tag derived from the parent task's title, e.g. "Book flights (Japan trip)".

Return ONLY a JSON array of the shape:
[{{"title": string, "duration": string}}, ...]{reminder}
Output (ONLY the JSON array):"#,
        title = parent.title,
    )
}

fn validate(subtasks: &[RawSubtask]) -> Result<Vec<SubtaskSpec>, String> {
    if !(2..=5).contains(&subtasks.len()) {
        return Err(format!(
            "expected 2-5 subtasks, got {}",
            subtasks.len()
        ));
    }
    let mut out = Vec::with_capacity(subtasks.len());
    for raw in subtasks {
        let duration = parse_duration(&raw.duration).map_err(|e| e.to_string())?;
        if duration.0 > MAX_SUBTASK_DURATION {
            return Err(format!(
                "subtask {:?} duration {} exceeds PT3H",
                raw.title,
                duration.to_iso8601()
            ));
        }
        out.push(SubtaskSpec {
            title: raw.title.clone(),
            duration: IsoDuration(duration.0),
        });
    }
    Ok(out)
}

pub async fn decompose(
    llm: &Arc<dyn LlmClient>,
    classified: &ClassifiedTask,
) -> Result<DecomposedTask, PipelineError> {
    for attempt in 0..2 {
        let strict = attempt == 1;
        let value = match llm.complete_json(&prompt(classified, strict)).await {
            Ok(v) => v,
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "LD LLM call failed, retrying");
                continue;
            }
            Err(e) => return Err(PipelineError::LdInvalid(e.to_string())),
        };

        let raw: Result<Vec<RawSubtask>, _> = serde_json::from_value(value);
        match raw {
            Ok(subtasks) => match validate(&subtasks) {
                Ok(subtasks) => {
                    return Ok(DecomposedTask {
                        classified: classified.clone(),
                        subtasks,
                    });
                }
                Err(reason) if attempt == 0 => {
                    tracing::warn!(reason, "LD output failed validation, retrying");
                    continue;
                }
                Err(reason) => return Err(PipelineError::LdInvalid(reason)),
            },
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "LD output did not match schema, retrying");
                continue;
            }
            Err(e) => return Err(PipelineError::LdInvalid(e.to_string())),
        }
    }
    unreachable!("loop always returns within two attempts")
}

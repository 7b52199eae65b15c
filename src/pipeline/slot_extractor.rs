//! SlotExtractor (SE) — spec §4.1.
//!
//! Asks the LLM to lift verbatim temporal substrings out of the query
//! without resolving anything relative ("tomorrow" stays "tomorrow"). One
//! retry with a stricter prompt on a JSON-parse failure, then fails with
//! `ParseLlm`.
//!
//! An all-null result is retried once (it is often a sign the model balked
//! rather than a real "no time expressions" finding) but is NOT a terminal
//! failure: a query like "Call mom" genuinely carries no temporal language,
//! and spec §8 S3 expects that to flow through to TD's atomic-task default
//! rather than abort the whole query at SE.

use std::sync::Arc;

use crate::domain::RawSlot;
use crate::error::{PipelineError, Stage};
use crate::llm::LlmClient;

fn prompt(query_text: &str, strict: bool) -> String {
    let reminder = if strict {
        "\nYour previous output was not valid JSON matching the schema. Respond with ONLY the JSON object, no commentary, no markdown fences."
    } else {
        ""
    };
    format!(
        r#"Extract temporal expressions from the sentence below, verbatim, without resolving relative words like "tomorrow" or "next week" to actual dates.

Return ONLY a JSON object of the shape:
{{"start_text": string|null, "end_text": string|null, "duration": string|null}}

Rules:
- Copy substrings exactly as they appear in the input; do not invent content.
- If the sentence gives no start time, "start_text" is null. Same for end and duration.
- Do not resolve "tomorrow", "next Friday", etc. — copy them as-is.

Sentence: "{query_text}"{reminder}
Output (ONLY the JSON object):"#
    )
}

pub async fn extract(llm: &Arc<dyn LlmClient>, query_text: &str) -> Result<RawSlot, PipelineError> {
    for attempt in 0..2 {
        let strict = attempt == 1;
        let value = llm
            .complete_json(&prompt(query_text, strict))
            .await
            .map_err(|e| PipelineError::ParseLlm {
                stage: Stage::Se,
                reason: e.to_string(),
            });
        let value = match value {
            Ok(v) => v,
            Err(e) if attempt == 0 => {
                tracing::warn!(error = %e, "SE LLM call failed, retrying");
                continue;
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_value::<RawSlot>(value) {
            Ok(slot) if !slot.is_empty() => return Ok(slot),
            Ok(empty) => {
                if attempt == 0 {
                    tracing::warn!("SE returned an empty slot, retrying with stricter prompt");
                    continue;
                }
                tracing::debug!("SE found no temporal expressions after retry; passing an empty slot downstream");
                return Ok(empty);
            }
            Err(e) => {
                if attempt == 0 {
                    tracing::warn!(error = %e, "SE output did not match schema, retrying");
                    continue;
                }
                return Err(PipelineError::ParseLlm {
                    stage: Stage::Se,
                    reason: e.to_string(),
                });
            }
        }
    }
    unreachable!("loop always returns within two attempts")
}

//! Structured (schema-constrained) output helpers
//!
//! Ollama honours the `format` schema, but smaller models still wrap their JSON
//! in code fences or prose now and then, so decoding is lenient about the
//! envelope and strict about the payload.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::{Message, PlanexecError, Result};
use crate::llm::traits::{GenerateOptions, LLMProvider};

/// JSON schema for a plan: `{ "steps": [string] }`
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "items": { "type": "string" },
                "description": "different steps to follow, in execution order"
            }
        },
        "required": ["steps"]
    })
}

/// JSON schema for a goal assessment
pub fn assessment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "is_satisfied": {
                "type": "boolean",
                "description": "Whether the goal has been satisfied"
            },
            "final_response": {
                "type": "string",
                "description": "Final response if satisfied, or what is still missing if not"
            },
            "is_list_output": {
                "type": "boolean",
                "description": "Whether the answer should be a list rather than text"
            },
            "json_output": {
                "description": "The answer as a list of strings or an object with one entry",
                "anyOf": [
                    { "type": "array", "items": { "type": "string" } },
                    { "type": "object", "additionalProperties": { "type": "string" } }
                ]
            }
        },
        "required": ["is_satisfied", "final_response"]
    })
}

/// Cut the JSON value out of a model reply
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end >= start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Decode a structured reply into `T`
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let json_str = extract_json(raw);
    serde_json::from_str(json_str).map_err(|e| {
        let preview: String = raw.chars().take(200).collect();
        PlanexecError::Other(format!(
            "Model returned invalid structured output ({}): {}",
            e, preview
        ))
    })
}

/// Ask `provider` for output matching `schema` and decode it into `T`
pub async fn request_structured<T: DeserializeOwned>(
    provider: &dyn LLMProvider,
    model: &str,
    messages: &[Message],
    schema: &Value,
    temperature: f32,
) -> Result<T> {
    let response = provider
        .chat_structured(
            model,
            messages,
            schema,
            Some(GenerateOptions::with_temperature(temperature)),
        )
        .await?;
    parse_structured(&response.content)
}

//! Goal assessor
//!
//! Decides whether the completed steps already satisfy the objective.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{format_history, format_plan, Message, PlanexecError, Result, StepRecord};
use crate::llm::structured::assessment_schema;
use crate::llm::{request_structured, LLMProvider};

/// Verdict of one goal assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub satisfied: bool,
    /// Final answer; meaningful only when `satisfied`
    pub answer: Option<String>,
    /// What is still missing when not satisfied
    pub feedback: Option<String>,
    /// Answer as JSON when the objective asks for a list
    pub structured: Option<Value>,
}

impl Assessment {
    pub fn satisfied(answer: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            answer: Some(answer.into()),
            feedback: None,
            structured: None,
        }
    }

    pub fn not_satisfied(feedback: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            answer: None,
            feedback: Some(feedback.into()),
            structured: None,
        }
    }

    /// No verdict could be obtained
    pub fn inconclusive() -> Self {
        Self {
            satisfied: false,
            answer: None,
            feedback: None,
            structured: None,
        }
    }

    /// A satisfied verdict must come with a non-empty answer
    pub fn normalized(mut self) -> Self {
        let has_answer = self.answer.as_deref().is_some_and(|a| !a.trim().is_empty());
        if self.satisfied && !has_answer {
            tracing::warn!("assessor reported success without an answer, treating as not satisfied");
            self.satisfied = false;
            self.answer = None;
            if self.feedback.is_none() {
                self.feedback = Some("The objective was reported as met but no answer was given.".to_string());
            }
        }
        self
    }
}

/// Judges progress towards the objective
#[async_trait]
pub trait GoalAssessor: Send + Sync {
    async fn assess(&self, objective: &str, plan: &[String], history: &[StepRecord]) -> Result<Assessment>;
}

#[derive(Debug, Deserialize)]
struct AssessmentReply {
    is_satisfied: bool,
    #[serde(default)]
    final_response: String,
    #[serde(default)]
    is_list_output: bool,
    #[serde(default)]
    json_output: Option<Value>,
}

impl AssessmentReply {
    fn into_assessment(self) -> Assessment {
        let text = self.final_response.trim().to_string();
        if !self.is_satisfied {
            return Assessment::not_satisfied(text);
        }

        let structured = self.json_output.filter(|v| !v.is_null());
        let answer = match (&structured, self.is_list_output) {
            (Some(value), true) => value.to_string(),
            _ => text,
        };
        Assessment {
            satisfied: true,
            answer: Some(answer),
            feedback: None,
            structured: if self.is_list_output { structured } else { None },
        }
    }
}

/// Goal assessor backed by a language model with JSON-schema output
pub struct LlmGoalAssessor {
    llm: Arc<dyn LLMProvider>,
    model: String,
}

impl LlmGoalAssessor {
    pub fn new(llm: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    fn build_messages(objective: &str, plan: &[String], history: &[StepRecord]) -> Vec<Message> {
        let system = "You assess whether an objective has been achieved from the steps executed so far.\n\
             If it has, set is_satisfied to true and put the complete final answer in final_response.\n\
             If the objective asks for a list, also set is_list_output to true and put the items in json_output.\n\
             If it has not, set is_satisfied to false and explain in final_response what is still missing.\n\
             Respond with JSON only.";

        let remaining = if plan.is_empty() {
            "(none)".to_string()
        } else {
            format_plan(plan)
        };
        let completed = if history.is_empty() {
            "(none)".to_string()
        } else {
            format_history(history)
        };
        let user = format!(
            "Objective:\n{}\n\nCompleted steps:\n{}\nRemaining plan:\n{}",
            objective, completed, remaining
        );

        vec![Message::system(system), Message::user(user)]
    }
}

#[async_trait]
impl GoalAssessor for LlmGoalAssessor {
    async fn assess(&self, objective: &str, plan: &[String], history: &[StepRecord]) -> Result<Assessment> {
        let messages = Self::build_messages(objective, plan, history);
        tracing::debug!(model = %self.model, completed = history.len(), "assessing goal");

        let reply: AssessmentReply =
            request_structured(self.llm.as_ref(), &self.model, &messages, &assessment_schema(), 0.0)
                .await
                .map_err(|e| PlanexecError::assessment(e.to_string()))?;

        Ok(reply.into_assessment().normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: Value) -> Assessment {
        let reply: AssessmentReply = serde_json::from_value(value).unwrap();
        reply.into_assessment().normalized()
    }

    #[test]
    fn test_text_answer() {
        let a = reply(json!({ "is_satisfied": true, "final_response": "4" }));
        assert!(a.satisfied);
        assert_eq!(a.answer.as_deref(), Some("4"));
        assert!(a.structured.is_none());
    }

    #[test]
    fn test_list_answer_uses_json_output() {
        let a = reply(json!({
            "is_satisfied": true,
            "final_response": "Rust, Go",
            "is_list_output": true,
            "json_output": ["Rust", "Go"]
        }));
        assert!(a.satisfied);
        assert_eq!(a.answer.as_deref(), Some(r#"["Rust","Go"]"#));
        assert_eq!(a.structured, Some(json!(["Rust", "Go"])));
    }

    #[test]
    fn test_unsatisfied_keeps_feedback() {
        let a = reply(json!({ "is_satisfied": false, "final_response": "B is missing" }));
        assert!(!a.satisfied);
        assert!(a.answer.is_none());
        assert_eq!(a.feedback.as_deref(), Some("B is missing"));
    }

    #[test]
    fn test_satisfied_without_answer_is_demoted() {
        let a = reply(json!({ "is_satisfied": true, "final_response": "  " }));
        assert!(!a.satisfied);
        assert!(a.feedback.is_some());
    }

    #[test]
    fn test_prompt_lists_history_and_plan() {
        let messages = LlmGoalAssessor::build_messages(
            "find A and B",
            &["look up B".to_string()],
            &[StepRecord::new("look up A", "A is 1")],
        );
        assert!(messages[1].content.contains("A is 1"));
        assert!(messages[1].content.contains("1. look up B"));
    }
}

//! Planner
//!
//! Turns an objective (and, when replanning, the work done so far) into an
//! ordered list of self-contained steps.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{format_history, Message, PlanexecError, Result, StepRecord};
use crate::llm::structured::plan_schema;
use crate::llm::{request_structured, LLMProvider};

/// Produces and revises plans
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan the steps still needed for `objective`.
    ///
    /// With an empty `history` this is the initial planning call; otherwise
    /// the completed steps and the latest assessor `feedback` are taken into
    /// account so finished work is not repeated. An empty list means the
    /// planner sees nothing left to do.
    async fn plan(
        &self,
        objective: &str,
        history: &[StepRecord],
        feedback: Option<&str>,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    steps: Vec<String>,
}

/// Planner backed by a language model with JSON-schema output
pub struct LlmPlanner {
    llm: Arc<dyn LLMProvider>,
    model: String,
    /// "name: description" of the tools steps may rely on
    tool_summary: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LLMProvider>, model: impl Into<String>, tool_summary: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            tool_summary: tool_summary.into(),
        }
    }

    fn system_prompt(&self) -> String {
        let tools = if self.tool_summary.is_empty() {
            "none".to_string()
        } else {
            self.tool_summary.clone()
        };
        format!(
            "For the given objective, come up with a simple step by step plan.\n\
             This plan should involve individual tasks that, if executed correctly, will yield the correct answer.\n\
             Use the available tools when appropriate. Available tools: {}\n\
             Do not add any superfluous steps. The result of the final step should be the final answer.\n\
             Make sure that each step has all the information needed and can be executed on its own; \
             never refer to other steps by number.\n\
             Respond with JSON: {{\"steps\": [\"...\"]}}",
            tools
        )
    }

    /// Build the request; identical to the initial request when `history` is empty
    pub fn build_messages(
        &self,
        objective: &str,
        history: &[StepRecord],
        feedback: Option<&str>,
    ) -> Vec<Message> {
        if history.is_empty() {
            return vec![Message::system(self.system_prompt()), Message::user(objective)];
        }

        let mut prompt = format!(
            "Your objective was this:\n{}\n\nYou have currently done the following steps:\n{}",
            objective,
            format_history(history)
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!("Take account of this assessment feedback:\n{}\n\n", feedback));
        }
        prompt.push_str(
            "Update your plan accordingly. Only add steps that still NEED to be done.\n\
             Do not return previously done steps, and do not add steps that are effectively the same \
             as steps already done. If nothing more is needed, return an empty list.",
        );

        vec![Message::system(self.system_prompt()), Message::user(prompt)]
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        objective: &str,
        history: &[StepRecord],
        feedback: Option<&str>,
    ) -> Result<Vec<String>> {
        if objective.trim().is_empty() {
            return Err(PlanexecError::planning("objective is empty"));
        }

        let messages = self.build_messages(objective, history, feedback);
        tracing::debug!(
            model = %self.model,
            replan = !history.is_empty(),
            completed = history.len(),
            "requesting plan"
        );

        let reply: PlanReply =
            request_structured(self.llm.as_ref(), &self.model, &messages, &plan_schema(), 0.0)
                .await
                .map_err(|e| PlanexecError::planning(e.to_string()))?;

        Ok(clean_steps(reply.steps))
    }
}

/// Trim steps and drop blank ones
pub fn clean_steps(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolDefinition;
    use crate::llm::{GenerateOptions, LLMResponse};
    use std::sync::Mutex;

    /// Replies with canned content and records the prompts it saw
    struct ScriptedLlm {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedLlm {
        fn new(reply: std::result::Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn chat(&self, model: &str, messages: &[Message], _o: Option<GenerateOptions>) -> Result<LLMResponse> {
            self.chat_structured(model, messages, &serde_json::Value::Null, None).await
        }

        async fn chat_with_tools(
            &self,
            model: &str,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _o: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            self.chat(model, messages, None).await
        }

        async fn chat_structured(
            &self,
            model: &str,
            messages: &[Message],
            _schema: &serde_json::Value,
            _o: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            match &self.reply {
                Ok(content) => Ok(LLMResponse::text(model, content.clone())),
                Err(e) => Err(PlanexecError::ollama(e.clone())),
            }
        }

        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn planner(llm: Arc<ScriptedLlm>) -> LlmPlanner {
        LlmPlanner::new(llm, "test-model", "search: Search the web")
    }

    #[tokio::test]
    async fn test_plan_parses_steps() {
        let llm = Arc::new(ScriptedLlm::new(Ok(r#"{"steps": ["search A", "  ", "search B"]}"#)));
        let steps = planner(llm.clone()).plan("find A and B", &[], None).await.unwrap();
        assert_eq!(steps, vec!["search A", "search B"]);

        let seen = llm.seen.lock().unwrap();
        assert!(seen[0][0].content.contains("search: Search the web"));
        assert_eq!(seen[0][1].content, "find A and B");
    }

    #[tokio::test]
    async fn test_model_failure_is_planning_error() {
        let llm = Arc::new(ScriptedLlm::new(Err("connection refused")));
        let err = planner(llm).plan("objective", &[], None).await.unwrap_err();
        assert!(matches!(err, PlanexecError::Planning(_)));
    }

    #[tokio::test]
    async fn test_invalid_structure_is_planning_error() {
        let llm = Arc::new(ScriptedLlm::new(Ok("Sure! First, search.")));
        let err = planner(llm).plan("objective", &[], None).await.unwrap_err();
        assert!(matches!(err, PlanexecError::Planning(_)));
    }

    #[tokio::test]
    async fn test_reply_without_steps_field_is_planning_error() {
        let llm = Arc::new(ScriptedLlm::new(Ok(r#"{"plan": ["search A", "search B"]}"#)));
        let err = planner(llm).plan("find A and B", &[], None).await.unwrap_err();
        assert!(matches!(err, PlanexecError::Planning(_)));
    }

    #[tokio::test]
    async fn test_empty_steps_list_is_a_valid_plan() {
        let llm = Arc::new(ScriptedLlm::new(Ok(r#"{"steps": []}"#)));
        let steps = planner(llm).plan("objective", &[], None).await.unwrap();
        assert!(steps.is_empty());
    }

    #[tokio::test]
    async fn test_empty_objective_rejected() {
        let llm = Arc::new(ScriptedLlm::new(Ok(r#"{"steps": ["x"]}"#)));
        assert!(planner(llm).plan("   ", &[], None).await.is_err());
    }

    #[test]
    fn test_replan_prompt_includes_history_and_feedback() {
        let llm = Arc::new(ScriptedLlm::new(Ok("{}")));
        let planner = planner(llm);
        let history = vec![StepRecord::new("search A", "A is 1")];
        let messages = planner.build_messages("find A and B", &history, Some("B is still missing"));
        let user = &messages[1].content;
        assert!(user.contains("Step: search A"));
        assert!(user.contains("A is 1"));
        assert!(user.contains("B is still missing"));
    }

    #[test]
    fn test_replan_with_empty_history_matches_initial_request() {
        let llm = Arc::new(ScriptedLlm::new(Ok("{}")));
        let planner = planner(llm);
        let initial = planner.build_messages("objective", &[], None);
        let replan = planner.build_messages("objective", &[], Some("ignored without history"));
        assert_eq!(initial.len(), replan.len());
        for (a, b) in initial.iter().zip(replan.iter()) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
    }
}

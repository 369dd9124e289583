//! Step executor
//!
//! Carries out one plan step with a bounded ReAct loop
//! (Thought → Action → Observation) over the tool registry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::loop_state::{Observation, StepLoopState};
use crate::core::{format_history, Message, StepRecord, ToolCall};
use crate::llm::{GenerateOptions, LLMProvider, LLMResponse};
use crate::tools::ToolRegistry;

/// Executes a single plan step and reports its result as text
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Never fails: problems are described in the returned text
    async fn execute(&self, step: &str, objective: &str, history: &[StepRecord]) -> String;
}

/// Step executor driving a tool-calling model through a bounded loop
pub struct ReactStepExecutor {
    llm: Arc<dyn LLMProvider>,
    model: String,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl ReactStepExecutor {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            tools,
            max_iterations: max_iterations.max(1),
        }
    }

    fn system_prompt(&self) -> String {
        let tools = if self.tools.is_empty() {
            "No tools are available; answer from your own knowledge.".to_string()
        } else {
            format!("Available tools: {}", self.tools.describe())
        };
        format!(
            "You are an agent executing one step of a larger plan. Follow the ReAct pattern:\n\
             1. THINK about what you need to do.\n\
             2. ACT by calling appropriate tools.\n\
             3. OBSERVE the results and continue or give the result of the step.\n\n\
             {}\n\n\
             Rules:\n\
             - Respond without tool calls ONLY when the step is complete; that response is the step result.\n\
             - Read the latest observation before choosing your next action.\n\
             - If a tool failed, try a different query or explain what could not be found.",
            tools
        )
    }

    fn task_prompt(step: &str, objective: &str, history: &[StepRecord]) -> String {
        let mut prompt = format!("Overall objective: {}\n\n", objective);
        if !history.is_empty() {
            prompt.push_str("Completed steps so far:\n");
            prompt.push_str(&format_history(history));
        }
        prompt.push_str(&format!("You are tasked with executing this step: {}", step));
        prompt
    }

    async fn next_action(&self, task: &str, state: &StepLoopState) -> crate::core::Result<LLMResponse> {
        let user_content = if state.observations.is_empty() {
            task.to_string()
        } else {
            format!("{}\n{}", task, state.render_observations())
        };
        let messages = vec![Message::system(self.system_prompt()), Message::user(user_content)];

        self.llm
            .chat_with_tools(
                &self.model,
                &messages,
                &self.tools.definitions(),
                Some(GenerateOptions::with_temperature(0.1)),
            )
            .await
    }

    /// Tool calls run one at a time, in the order the model issued them
    async fn execute_tools(&self, tool_calls: &[ToolCall]) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            tracing::debug!(tool = %call.name, "executing tool");
            observations.push(Observation::from(self.tools.execute(call).await));
        }
        observations
    }

    async fn synthesize(&self, step: &str, state: &StepLoopState) -> String {
        let prompt = format!(
            "You were executing this step: {}\n\n\
             Based on the following tool observations, give the best possible result for the step:{}",
            step,
            state.render_observations()
        );

        match self
            .llm
            .chat(
                &self.model,
                &[Message::user(prompt)],
                Some(GenerateOptions::with_temperature(0.3)),
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => fallback_text(step, state),
            Err(e) => {
                tracing::warn!(%step, "synthesis failed: {}", e);
                fallback_text(step, state)
            }
        }
    }
}

/// Explanation returned when no answer could be produced at all
fn fallback_text(step: &str, state: &StepLoopState) -> String {
    match state.last_success() {
        Some(obs) => format!(
            "Could not finish the step '{}' within {} iterations. Last tool output:\n{}",
            step, state.max_iterations, obs.text
        ),
        None => format!(
            "Could not complete the step '{}': no usable result after {} iterations ({} failed tool or model calls).",
            step,
            state.max_iterations,
            state.observations.len()
        ),
    }
}

#[async_trait]
impl StepExecutor for ReactStepExecutor {
    async fn execute(&self, step: &str, objective: &str, history: &[StepRecord]) -> String {
        let task = Self::task_prompt(step, objective, history);
        let mut state = StepLoopState::new(self.max_iterations);

        while state.should_continue() {
            let iteration = state.iteration + 1;
            tracing::debug!(iteration, max = state.max_iterations, "step iteration");

            let response = match self.next_action(&task, &state).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(iteration, "executor model call failed: {}", e);
                    state.record([Observation::failed("model", e.to_string())]);
                    continue;
                }
            };

            if response.tool_calls.is_empty() {
                if response.content.trim().is_empty() {
                    state.record([Observation::failed(
                        "model",
                        "Empty response without tool calls",
                    )]);
                    continue;
                }
                state.finish(response.content);
                break;
            }

            let observations = self.execute_tools(&response.tool_calls).await;
            state.record(observations);
        }

        let answer = match state.result.take() {
            Some(answer) => answer,
            None => {
                tracing::info!(
                    iterations = state.iteration,
                    observations = state.observations.len(),
                    "iteration cap reached, synthesizing step result"
                );
                self.synthesize(step, &state).await
            }
        };

        tracing::debug!(
            iterations = state.iteration,
            ok = state.successes(),
            "step complete"
        );
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PlanexecError, Result, ToolDefinition};
    use crate::tools::{SearchHit, SearchProvider};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back a queue of responses to tool-calling requests
    struct QueuedLlm {
        replies: Mutex<VecDeque<Result<LLMResponse>>>,
        synthesis: Option<String>,
    }

    impl QueuedLlm {
        fn new(replies: Vec<Result<LLMResponse>>, synthesis: Option<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                synthesis: synthesis.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for QueuedLlm {
        async fn chat(&self, model: &str, _m: &[Message], _o: Option<GenerateOptions>) -> Result<LLMResponse> {
            match &self.synthesis {
                Some(text) => Ok(LLMResponse::text(model, text.clone())),
                None => Err(PlanexecError::ollama("synthesis unavailable")),
            }
        }

        async fn chat_with_tools(
            &self,
            model: &str,
            _m: &[Message],
            _t: &[ToolDefinition],
            _o: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMResponse::text(model, "")))
        }

        async fn chat_structured(
            &self,
            _model: &str,
            _m: &[Message],
            _s: &serde_json::Value,
            _o: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            Err(PlanexecError::Other("not used".to_string()))
        }

        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "queued"
        }
    }

    struct DownSearch;

    #[async_trait]
    impl SearchProvider for DownSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>> {
            Err(PlanexecError::search("503 Service Unavailable"))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn search_call(query: &str) -> LLMResponse {
        LLMResponse {
            content: String::new(),
            tool_calls: vec![ToolCall::new("search", serde_json::json!({ "query": query }))],
            usage: None,
            model: "m".to_string(),
        }
    }

    fn executor(llm: QueuedLlm, max_iterations: usize) -> ReactStepExecutor {
        let tools = ToolRegistry::with_search(Arc::new(DownSearch), 5);
        ReactStepExecutor::new(Arc::new(llm), "m", Arc::new(tools), max_iterations)
    }

    #[tokio::test]
    async fn test_direct_answer_is_step_result() {
        let llm = QueuedLlm::new(vec![Ok(LLMResponse::text("m", "Paris"))], None);
        let result = executor(llm, 3).execute("capital of France", "trivia", &[]).await;
        assert_eq!(result, "Paris");
    }

    #[tokio::test]
    async fn test_tool_failure_then_answer() {
        let llm = QueuedLlm::new(
            vec![
                Ok(search_call("capital of France")),
                Ok(LLMResponse::text("m", "Search is down; from memory: Paris")),
            ],
            None,
        );
        let result = executor(llm, 3).execute("capital of France", "trivia", &[]).await;
        assert!(result.contains("Paris"));
    }

    #[tokio::test]
    async fn test_model_errors_do_not_abort_step() {
        let llm = QueuedLlm::new(
            vec![
                Err(PlanexecError::ollama("connection reset")),
                Ok(LLMResponse::text("m", "42")),
            ],
            None,
        );
        let result = executor(llm, 3).execute("answer", "objective", &[]).await;
        assert_eq!(result, "42");
    }

    #[tokio::test]
    async fn test_cap_reached_synthesizes() {
        let llm = QueuedLlm::new(
            vec![Ok(search_call("a")), Ok(search_call("b"))],
            Some("best guess from observations"),
        );
        let result = executor(llm, 2).execute("find a", "objective", &[]).await;
        assert_eq!(result, "best guess from observations");
    }

    #[tokio::test]
    async fn test_cap_reached_and_synthesis_fails_explains() {
        let llm = QueuedLlm::new(vec![Ok(search_call("a")), Ok(search_call("b"))], None);
        let result = executor(llm, 2).execute("find a", "objective", &[]).await;
        assert!(result.contains("Could not complete the step 'find a'"));
    }

    #[test]
    fn test_task_prompt_includes_history() {
        let history = vec![StepRecord::new("look up A", "A is 1")];
        let prompt = ReactStepExecutor::task_prompt("look up B", "find A and B", &history);
        assert!(prompt.contains("find A and B"));
        assert!(prompt.contains("Step: look up A"));
        assert!(prompt.ends_with("look up B"));
    }
}

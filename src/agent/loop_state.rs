//! Step executor loop state
//!
//! Bookkeeping for one bounded reason/act loop: iterations spent, tool
//! observations gathered, and the step result once the model gives one.

use serde::{Deserialize, Serialize};

use crate::core::ToolResult;

#[derive(Debug, Clone)]
pub struct StepLoopState {
    /// Iterations completed so far
    pub iteration: usize,
    pub max_iterations: usize,
    pub observations: Vec<Observation>,
    /// Set when the model answers without calling a tool
    pub result: Option<String>,
}

impl StepLoopState {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            observations: Vec::new(),
            result: None,
        }
    }

    /// Budget left and no result yet
    pub fn should_continue(&self) -> bool {
        self.iteration < self.max_iterations && self.result.is_none()
    }

    /// Close the current iteration with what it observed
    pub fn record(&mut self, observations: impl IntoIterator<Item = Observation>) {
        self.observations.extend(observations);
        self.iteration += 1;
    }

    pub fn finish(&mut self, result: String) {
        self.result = Some(result);
    }

    /// Observations as a prompt section; empty when there are none
    pub fn render_observations(&self) -> String {
        if self.observations.is_empty() {
            return String::new();
        }

        let mut output = String::from("\n\n## Tool Observations:\n");
        for (i, obs) in self.observations.iter().enumerate() {
            output.push_str(&format!(
                "\n### Observation {} ({}, {})\n{}\n",
                i + 1,
                obs.source,
                if obs.ok { "ok" } else { "error" },
                obs.text
            ));
        }
        output
    }

    pub fn successes(&self) -> usize {
        self.observations.iter().filter(|o| o.ok).count()
    }

    /// Most recent successful tool output
    pub fn last_success(&self) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.ok)
    }
}

/// What one tool call (or failed model call) reported back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Tool name, or "model" for a failed model call
    pub source: String,
    pub ok: bool,
    pub text: String,
}

impl Observation {
    pub fn ok(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ok: true,
            text: text.into(),
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ok: false,
            text: error.into(),
        }
    }
}

impl From<ToolResult> for Observation {
    fn from(result: ToolResult) -> Self {
        Self {
            source: result.tool_name,
            ok: result.success,
            text: result.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let mut state = StepLoopState::new(2);
        assert!(state.should_continue());
        state.record(vec![]);
        assert!(state.should_continue());
        state.record(vec![]);
        assert!(!state.should_continue());
        assert_eq!(state.iteration, 2);
    }

    #[test]
    fn test_result_stops_loop() {
        let mut state = StepLoopState::new(5);
        state.finish("done".to_string());
        assert!(!state.should_continue());
    }

    #[test]
    fn test_render_observations() {
        let mut state = StepLoopState::new(10);
        assert_eq!(state.render_observations(), "");

        state.record(vec![
            Observation::failed("search", "Search failed: timeout"),
            Observation::ok("search", "1. Rust homepage"),
        ]);

        let rendered = state.render_observations();
        assert!(rendered.contains("(search, error)"));
        assert!(rendered.contains("Rust homepage"));
        assert_eq!(state.successes(), 1);
        assert_eq!(state.last_success().map(|o| o.text.as_str()), Some("1. Rust homepage"));
    }

    #[test]
    fn test_from_tool_result() {
        let obs = Observation::from(ToolResult::failure("search", "Missing 'query' argument"));
        assert!(!obs.ok);
        assert_eq!(obs.source, "search");
    }
}

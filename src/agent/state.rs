//! Shared execution state for one plan/execute run
//!
//! [`ExecutionState`] is created per run, moved through every phase of the
//! control loop, and turned into a [`RunOutcome`] at the end. Its mutators
//! enforce the run invariants: history only grows, the response is assigned
//! once, and nothing changes after the response is set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{PlanexecError, Result, StepRecord};

/// Fallback answer when nothing usable was produced
pub const UNABLE_TO_COMPLETE: &str = "Unable to complete the objective.";

/// Control loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Planning,
    Executing,
    Assessing,
    Replanning,
    Done,
}

/// Phase a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    Assessing,
    Replanning,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Planning => write!(f, "planning"),
            Phase::Executing => write!(f, "executing"),
            Phase::Assessing => write!(f, "assessing"),
            Phase::Replanning => write!(f, "replanning"),
        }
    }
}

/// A fatal run failure, tagged with the phase it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub phase: Phase,
    pub message: String,
}

impl RunFailure {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

/// Why a run reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The assessor confirmed the objective
    Satisfied,
    /// A planner call returned no further steps
    PlanExhausted,
    /// The replanning ceiling was hit
    ReplanCeiling,
    /// The total step ceiling was hit
    StepCeiling,
    /// The run deadline elapsed
    DeadlineExceeded,
    /// A fatal error ended the run
    Failed,
}

/// Mutable record threaded through the control loop
#[derive(Debug, Clone)]
pub struct ExecutionState {
    objective: String,
    plan: Vec<String>,
    history: Vec<StepRecord>,
    response: Option<String>,
    feedback: Option<String>,
    replans: usize,
}

impl ExecutionState {
    /// Fresh state for `objective` with an empty plan and history
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            plan: Vec::new(),
            history: Vec::new(),
            response: None,
            feedback: None,
            replans: 0,
        }
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Remaining steps, next step first
    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Latest assessor explanation of what is still missing
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Replanning transitions taken so far
    pub fn replans(&self) -> usize {
        self.replans
    }

    /// Whether a final response has been assigned
    pub fn is_done(&self) -> bool {
        self.response.is_some()
    }

    /// Step at the head of the plan
    pub fn next_step(&self) -> Option<&str> {
        self.plan.first().map(String::as_str)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.response.is_some() {
            return Err(PlanexecError::ResponseAlreadySet);
        }
        Ok(())
    }

    /// Replace the whole plan
    pub fn set_plan(&mut self, steps: Vec<String>) -> Result<()> {
        self.ensure_running()?;
        self.plan = steps;
        Ok(())
    }

    /// Pop the head step and append it with its result to the history
    pub fn complete_step(&mut self, result: impl Into<String>) -> Result<&StepRecord> {
        self.ensure_running()?;
        if self.plan.is_empty() {
            return Err(PlanexecError::Other("No planned step to complete".to_string()));
        }
        let step = self.plan.remove(0);
        self.history.push(StepRecord::new(step, result));
        Ok(&self.history[self.history.len() - 1])
    }

    /// Enter a replanning round; only legal with an empty plan and no response
    pub fn begin_replan(&mut self) -> Result<()> {
        self.ensure_running()?;
        if !self.plan.is_empty() {
            return Err(PlanexecError::Other(format!(
                "Cannot replan with {} steps still planned",
                self.plan.len()
            )));
        }
        self.replans += 1;
        Ok(())
    }

    pub fn set_feedback(&mut self, feedback: Option<String>) {
        self.feedback = feedback.filter(|f| !f.trim().is_empty());
    }

    /// Assign the final response; a second assignment is an error
    pub fn set_response(&mut self, response: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        self.plan.clear();
        self.response = Some(response.into());
        Ok(())
    }

    /// Best answer available without a positive assessment: the latest
    /// assessor feedback, else the last step result, else a generic marker
    pub fn best_effort_response(&self) -> String {
        if let Some(feedback) = self.feedback() {
            return feedback.to_string();
        }
        self.history
            .last()
            .map(|record| record.result.clone())
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| UNABLE_TO_COMPLETE.to_string())
    }

    /// Finish the run and produce the caller-facing outcome
    pub fn into_outcome(self, termination: Termination, error: Option<RunFailure>) -> RunOutcome {
        let success = termination == Termination::Satisfied && error.is_none();
        let response_text = match (&self.response, &error) {
            (Some(response), _) => response.clone(),
            (None, Some(failure)) => failure.to_string(),
            (None, None) => self.best_effort_response(),
        };
        RunOutcome {
            objective: self.objective,
            response_text,
            history: self.history,
            success,
            error,
            termination,
            replans: self.replans,
        }
    }
}

/// Result of one control loop run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub objective: String,
    pub response_text: String,
    pub history: Vec<StepRecord>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    pub termination: Termination,
    pub replans: usize,
}

impl RunOutcome {
    /// Text for the execution log's `error` field
    pub fn error_message(&self) -> Option<String> {
        match (&self.error, self.termination) {
            (Some(failure), _) => Some(failure.to_string()),
            (None, Termination::Satisfied) => None,
            (None, Termination::PlanExhausted) => {
                Some("Plan exhausted without satisfying the objective".to_string())
            }
            (None, Termination::ReplanCeiling) => Some(format!(
                "Replan ceiling reached after {} replans",
                self.replans
            )),
            (None, Termination::StepCeiling) => Some("Step ceiling reached".to_string()),
            (None, Termination::DeadlineExceeded) => Some("Run deadline exceeded".to_string()),
            (None, Termination::Failed) => Some("Run failed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_step_moves_head_into_history() {
        let mut state = ExecutionState::new("What is 2+2?");
        state
            .set_plan(vec!["compute 2+2".to_string(), "report".to_string()])
            .unwrap();

        let record = state.complete_step("4").unwrap();
        assert_eq!(record, &StepRecord::new("compute 2+2", "4"));
        assert_eq!(state.plan(), ["report".to_string()]);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_complete_step_without_plan_fails() {
        let mut state = ExecutionState::new("objective");
        assert!(state.complete_step("x").is_err());
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_response_is_assigned_once() {
        let mut state = ExecutionState::new("objective");
        state.set_response("first").unwrap();
        assert!(matches!(
            state.set_response("second"),
            Err(PlanexecError::ResponseAlreadySet)
        ));
        assert_eq!(state.response(), Some("first"));
    }

    #[test]
    fn test_no_mutation_after_response() {
        let mut state = ExecutionState::new("objective");
        state.set_plan(vec!["a".to_string()]).unwrap();
        state.set_response("done").unwrap();
        assert!(state.plan().is_empty());
        assert!(state.set_plan(vec!["b".to_string()]).is_err());
        assert!(state.complete_step("r").is_err());
        assert!(state.begin_replan().is_err());
    }

    #[test]
    fn test_replan_requires_empty_plan() {
        let mut state = ExecutionState::new("objective");
        state.set_plan(vec!["a".to_string()]).unwrap();
        assert!(state.begin_replan().is_err());
        state.complete_step("r").unwrap();
        state.begin_replan().unwrap();
        assert_eq!(state.replans(), 1);
    }

    #[test]
    fn test_best_effort_prefers_feedback() {
        let mut state = ExecutionState::new("objective");
        assert_eq!(state.best_effort_response(), UNABLE_TO_COMPLETE);

        state.set_plan(vec!["step1".to_string()]).unwrap();
        state.complete_step("partial").unwrap();
        assert_eq!(state.best_effort_response(), "partial");

        state.set_feedback(Some("missing the second source".to_string()));
        assert_eq!(state.best_effort_response(), "missing the second source");

        state.set_feedback(Some("   ".to_string()));
        assert!(state.feedback().is_none());
    }

    #[test]
    fn test_outcome_success_only_when_satisfied() {
        let mut state = ExecutionState::new("objective");
        state.set_response("4").unwrap();
        let outcome = state.into_outcome(Termination::Satisfied, None);
        assert!(outcome.success);
        assert_eq!(outcome.response_text, "4");
        assert!(outcome.error_message().is_none());

        let forced = ExecutionState::new("objective").into_outcome(Termination::ReplanCeiling, None);
        assert!(!forced.success);
        assert_eq!(forced.response_text, UNABLE_TO_COMPLETE);
        assert!(forced.error_message().unwrap().contains("Replan ceiling"));
    }

    #[test]
    fn test_failure_outcome_carries_phase() {
        let failure = RunFailure::new(Phase::Planning, "model unreachable");
        let outcome = ExecutionState::new("objective")
            .into_outcome(Termination::Failed, Some(failure.clone()));
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(failure));
        assert_eq!(outcome.response_text, "planning failed: model unreachable");
    }
}

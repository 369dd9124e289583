//! Agent orchestrator
//!
//! Plan → execute → assess → replan control loop. The loop is an explicit
//! state machine: [`PlanExecuteAgent::transition`] takes the current
//! [`ControlState`] and the run's [`ExecutionState`] by value and hands back
//! either the next state or the finished run.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::assessor::{Assessment, GoalAssessor, LlmGoalAssessor};
use crate::agent::executor::{ReactStepExecutor, StepExecutor};
use crate::agent::planner::{LlmPlanner, Planner};
use crate::agent::retry::RetryPolicy;
use crate::agent::state::{
    ControlState, ExecutionState, Phase, RunFailure, RunOutcome, Termination,
};
use crate::core::config::AgentConfig;
use crate::core::{Config, PlanexecError, Result};
use crate::llm::{LLMProvider, OllamaClient};
use crate::tools::{TavilySearch, ToolRegistry};

/// Hard bounds on a single run
#[derive(Debug, Clone)]
pub struct AgentLimits {
    /// Replanning transitions allowed before the run is forced to finish
    pub max_replans: usize,
    /// Steps executed across the whole run
    pub max_steps: usize,
    /// Assess once when the first plan is empty instead of stopping outright
    pub assess_empty_plan: bool,
    /// Budget for one planner, executor or assessor call
    pub call_timeout: Duration,
    /// Budget for the whole run
    pub run_timeout: Duration,
}

impl AgentLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_replans: config.max_replans,
            max_steps: config.max_steps.max(1),
            assess_empty_plan: config.assess_empty_plan,
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
            run_timeout: Duration::from_secs(config.run_timeout_secs.max(1)),
        }
    }
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Result of one state machine transition
#[derive(Debug)]
pub enum Transition {
    /// Continue in the given state
    Next(ControlState, ExecutionState),
    /// The run is over
    Done {
        state: ExecutionState,
        termination: Termination,
        error: Option<RunFailure>,
    },
}

impl Transition {
    fn finish(state: ExecutionState, termination: Termination) -> Self {
        Transition::Done {
            state,
            termination,
            error: None,
        }
    }

    fn fail(state: ExecutionState, phase: Phase, error: impl ToString) -> Self {
        Transition::Done {
            state,
            termination: Termination::Failed,
            error: Some(RunFailure::new(phase, error.to_string())),
        }
    }
}

/// Plan-and-execute agent
pub struct PlanExecuteAgent {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    assessor: Arc<dyn GoalAssessor>,
    limits: AgentLimits,
    retry: RetryPolicy,
}

impl PlanExecuteAgent {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        assessor: Arc<dyn GoalAssessor>,
        limits: AgentLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            planner,
            executor,
            assessor,
            limits,
            retry,
        }
    }

    /// Wire the Ollama-backed planner, executor and assessor from configuration.
    ///
    /// Without a search API key the executor runs with no tools.
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm: Arc<dyn LLMProvider> = Arc::new(OllamaClient::from_config(config)?);

        let tools = match TavilySearch::from_config(&config.search) {
            Ok(search) => ToolRegistry::with_search(Arc::new(search), config.search.max_results),
            Err(e) => {
                tracing::warn!("web search disabled: {}", e);
                ToolRegistry::new()
            }
        };
        let tools = Arc::new(tools);

        let planner = LlmPlanner::new(llm.clone(), &config.models.planner, tools.describe());
        let executor = ReactStepExecutor::new(
            llm.clone(),
            &config.models.executor,
            tools,
            config.agent.max_agent_iterations,
        );
        let assessor = LlmGoalAssessor::new(llm, &config.models.assessor);

        Ok(Self::new(
            Arc::new(planner),
            Arc::new(executor),
            Arc::new(assessor),
            AgentLimits::from_config(&config.agent),
            RetryPolicy::from_config(&config.retry),
        ))
    }

    pub fn limits(&self) -> &AgentLimits {
        &self.limits
    }

    /// Run the control loop for `objective` to completion.
    ///
    /// Never returns an error: failures are reported in the outcome.
    pub async fn run(&self, objective: &str) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.drive(objective).instrument(span).await
    }

    async fn drive(&self, objective: &str) -> RunOutcome {
        let deadline = Instant::now() + self.limits.run_timeout;
        tracing::info!(objective, "starting run");

        let mut control = ControlState::Planning;
        let mut state = ExecutionState::new(objective);

        loop {
            if Instant::now() >= deadline {
                tracing::warn!(state = ?control, "run deadline exceeded");
                return Self::conclude(state, Termination::DeadlineExceeded, None);
            }

            match self.transition(control, state, deadline).await {
                Transition::Next(next, next_state) => {
                    tracing::debug!(from = ?control, to = ?next, "transition");
                    control = next;
                    state = next_state;
                }
                Transition::Done {
                    state,
                    termination,
                    error,
                } => {
                    // A call cut short by the run deadline counts as the deadline, not a failure
                    let termination = if termination == Termination::Failed && Instant::now() >= deadline {
                        Termination::DeadlineExceeded
                    } else {
                        termination
                    };
                    return Self::conclude(state, termination, error);
                }
            }
        }
    }

    fn conclude(state: ExecutionState, termination: Termination, error: Option<RunFailure>) -> RunOutcome {
        let outcome = state.into_outcome(termination, error);
        match &outcome.error {
            Some(failure) => tracing::error!(termination = ?outcome.termination, "run failed: {}", failure),
            None => tracing::info!(
                termination = ?outcome.termination,
                success = outcome.success,
                steps = outcome.history.len(),
                replans = outcome.replans,
                "run finished"
            ),
        }
        outcome
    }

    /// Time left for one delegated call
    fn call_budget(&self, deadline: Instant) -> Duration {
        self.limits
            .call_timeout
            .min(deadline.saturating_duration_since(Instant::now()))
    }

    /// Advance the state machine by one state
    pub async fn transition(
        &self,
        control: ControlState,
        state: ExecutionState,
        deadline: Instant,
    ) -> Transition {
        match control {
            ControlState::Planning => self.on_planning(state, deadline).await,
            ControlState::Executing => self.on_executing(state, deadline).await,
            ControlState::Assessing => self.on_assessing(state, deadline).await,
            ControlState::Replanning => self.on_replanning(state, deadline).await,
            ControlState::Done => {
                let termination = if state.is_done() {
                    Termination::Satisfied
                } else {
                    Termination::Failed
                };
                Transition::finish(state, termination)
            }
        }
    }

    async fn request_plan(&self, state: &ExecutionState, deadline: Instant) -> Result<Vec<String>> {
        let planner = &self.planner;
        let (objective, history, feedback) = (state.objective(), state.history(), state.feedback());
        self.retry
            .run("planner call", self.limits.call_timeout, deadline, move || {
                planner.plan(objective, history, feedback)
            })
            .await
    }

    async fn on_planning(&self, mut state: ExecutionState, deadline: Instant) -> Transition {
        let steps = match self.request_plan(&state, deadline).await {
            Ok(steps) => steps,
            Err(e) => return Transition::fail(state, Phase::Planning, e),
        };
        tracing::info!(steps = steps.len(), "initial plan ready");

        let empty = steps.is_empty();
        if let Err(e) = state.set_plan(steps) {
            return Transition::fail(state, Phase::Planning, e);
        }

        match (empty, self.limits.assess_empty_plan) {
            (false, _) => Transition::Next(ControlState::Executing, state),
            (true, true) => Transition::Next(ControlState::Assessing, state),
            (true, false) => Transition::finish(state, Termination::PlanExhausted),
        }
    }

    async fn on_executing(&self, mut state: ExecutionState, deadline: Instant) -> Transition {
        if state.history().len() >= self.limits.max_steps {
            tracing::warn!(max_steps = self.limits.max_steps, "step ceiling reached");
            return Transition::finish(state, Termination::StepCeiling);
        }

        let Some(step) = state.next_step().map(str::to_string) else {
            return Transition::Next(ControlState::Assessing, state);
        };
        tracing::info!(step = state.history().len() + 1, %step, "executing step");

        let budget = self.call_budget(deadline);
        let execution = self.executor.execute(&step, state.objective(), state.history());
        let result = match tokio::time::timeout(budget, execution).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%step, "step timed out");
                PlanexecError::timeout("step execution", budget).to_string()
            }
        };

        if let Err(e) = state.complete_step(result) {
            return Transition::fail(state, Phase::Executing, e);
        }
        Transition::Next(ControlState::Assessing, state)
    }

    async fn request_assessment(&self, state: &ExecutionState, deadline: Instant) -> Assessment {
        let assessor = &self.assessor;
        let (objective, plan, history) = (state.objective(), state.plan(), state.history());
        let verdict = self
            .retry
            .run("assessor call", self.limits.call_timeout, deadline, move || {
                assessor.assess(objective, plan, history)
            })
            .await;

        match verdict {
            Ok(assessment) => assessment.normalized(),
            Err(e) => {
                tracing::warn!("assessment unavailable, continuing as not satisfied: {}", e);
                Assessment::inconclusive()
            }
        }
    }

    async fn on_assessing(&self, mut state: ExecutionState, deadline: Instant) -> Transition {
        let assessment = self.request_assessment(&state, deadline).await;

        if assessment.satisfied {
            let answer = assessment.answer.unwrap_or_default();
            tracing::info!("objective satisfied");
            return match state.set_response(answer) {
                Ok(()) => Transition::finish(state, Termination::Satisfied),
                Err(e) => Transition::fail(state, Phase::Assessing, e),
            };
        }

        if assessment.feedback.is_some() {
            state.set_feedback(assessment.feedback);
        }

        if !state.plan().is_empty() {
            return Transition::Next(ControlState::Executing, state);
        }

        // Only an empty initial plan reaches assessment with nothing executed
        if state.history().is_empty() {
            tracing::info!("empty plan and objective not met");
            return Transition::finish(state, Termination::PlanExhausted);
        }

        if state.replans() >= self.limits.max_replans {
            tracing::warn!(max_replans = self.limits.max_replans, "replan ceiling reached");
            return Transition::finish(state, Termination::ReplanCeiling);
        }

        match state.begin_replan() {
            Ok(()) => Transition::Next(ControlState::Replanning, state),
            Err(e) => Transition::fail(state, Phase::Assessing, e),
        }
    }

    async fn on_replanning(&self, mut state: ExecutionState, deadline: Instant) -> Transition {
        tracing::info!(replan = state.replans(), "replanning");
        let steps = match self.request_plan(&state, deadline).await {
            Ok(steps) => steps,
            Err(e) => return Transition::fail(state, Phase::Replanning, e),
        };

        if steps.is_empty() {
            tracing::info!("replanner has no further steps");
            return Transition::finish(state, Termination::PlanExhausted);
        }

        tracing::info!(steps = steps.len(), "revised plan ready");
        if let Err(e) = state.set_plan(steps) {
            return Transition::fail(state, Phase::Replanning, e);
        }
        Transition::Next(ControlState::Executing, state)
    }
}

/// Check that Ollama is reachable and the configured models are pulled
pub async fn verify_models(llm: &dyn LLMProvider, config: &Config) -> Result<()> {
    let available = llm
        .list_models()
        .await
        .map_err(|_| PlanexecError::OllamaNotReachable(config.ollama_url()))?;
    tracing::debug!(?available, "available models");

    for model in [
        &config.models.planner,
        &config.models.executor,
        &config.models.assessor,
    ] {
        if !llm.is_model_available(model).await? {
            return Err(PlanexecError::ModelNotFound(model.clone()));
        }
    }
    Ok(())
}

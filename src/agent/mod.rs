//! Agent module - plan/execute/assess control loop
//!
//! Contains the planner, step executor and goal assessor seams, the shared
//! execution state, and the orchestrator that drives them.

pub mod assessor;
pub mod executor;
pub mod loop_state;
pub mod orchestrator;
pub mod planner;
pub mod retry;
pub mod state;

pub use assessor::{Assessment, GoalAssessor, LlmGoalAssessor};
pub use executor::{ReactStepExecutor, StepExecutor};
pub use loop_state::{Observation, StepLoopState};
pub use orchestrator::{verify_models, AgentLimits, PlanExecuteAgent, Transition};
pub use planner::{LlmPlanner, Planner};
pub use retry::RetryPolicy;
pub use state::{
    ControlState, ExecutionState, Phase, RunFailure, RunOutcome, Termination, UNABLE_TO_COMPLETE,
};

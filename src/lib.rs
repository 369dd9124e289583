//! planexec - plan-and-execute agent over local Ollama models
//!
//! An objective is split into steps by a planner model, each step is carried
//! out by a tool-using executor, and an assessor decides after every step
//! whether the objective is met or the plan needs revising.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: LLM provider abstraction with Ollama implementation
//! - **Tools**: Web search adapter and tool registry
//! - **Agent**: Planner, step executor, goal assessor and the control loop
//! - **Workflow**: Stored workflow definitions, execution logs, runner
//! - **CLI**: Command handlers for the binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use planexec::{Config, PlanExecuteAgent};
//!
//! #[tokio::main]
//! async fn main() -> planexec::Result<()> {
//!     let agent = PlanExecuteAgent::from_config(&Config::load())?;
//!     let outcome = agent.run("Who won the 2022 World Cup?").await;
//!     println!("{}", outcome.response_text);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;
pub mod workflow;

// Re-export commonly used items
pub use agent::{PlanExecuteAgent, RunOutcome};
pub use core::{Config, PlanexecError, Result};
pub use workflow::{FileWorkflowStore, WorkflowRunner, WorkflowStore};

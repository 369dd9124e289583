//! Runs stored workflows and records their execution logs

use std::sync::Arc;

use chrono::Utc;

use crate::agent::{PlanExecuteAgent, RunOutcome};
use crate::core::{PlanexecError, Result};
use crate::workflow::log::ExecutionLog;
use crate::workflow::store::WorkflowStore;

pub struct WorkflowRunner {
    agent: Arc<PlanExecuteAgent>,
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowRunner {
    pub fn new(agent: Arc<PlanExecuteAgent>, store: Arc<dyn WorkflowStore>) -> Self {
        Self { agent, store }
    }

    /// Run workflow `id` with its first action prompt as the objective.
    ///
    /// Store failures are returned as errors; a run that fails still
    /// produces an outcome and a log entry.
    pub async fn run(&self, id: &str) -> Result<RunOutcome> {
        let workflow = self.store.load(id).await?;
        let objective = workflow
            .objective()
            .ok_or_else(|| {
                PlanexecError::InvalidWorkflow(format!("workflow '{}' has no action node prompt", id))
            })?
            .to_string();

        tracing::info!(workflow = %id, name = %workflow.metadata.name, "running workflow");
        let started = Utc::now();
        let outcome = self.agent.run(&objective).await;
        let finished = Utc::now();

        let log = ExecutionLog::from_outcome(&workflow.metadata.name, started, finished, &outcome);
        self.store
            .append_execution_log(id, log)
            .await
            .map_err(|e| match e {
                PlanexecError::Store(_) => e,
                other => PlanexecError::store(format!("Failed to record execution log: {}", other)),
            })?;

        Ok(outcome)
    }
}

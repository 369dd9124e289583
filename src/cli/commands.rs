//! CLI commands
//!
//! Handlers behind the `planexec` subcommands. Each returns the text to print.

use std::path::Path;
use std::sync::Arc;

use crate::agent::{verify_models, PlanExecuteAgent, RunOutcome};
use crate::core::{format_plan, Config, PlanexecError, Result};
use crate::llm::OllamaClient;
use crate::workflow::{
    ExecutionLog, FileWorkflowStore, WorkflowRunner, WorkflowStore, WorkflowSummary,
};

/// Open the configured workflow store
pub async fn open_store(config: &Config) -> Result<Arc<dyn WorkflowStore>> {
    let store = FileWorkflowStore::open(config.workflows_file()).await?;
    Ok(Arc::new(store))
}

async fn build_agent(config: &Config) -> Result<PlanExecuteAgent> {
    let llm = OllamaClient::from_config(config)?;
    verify_models(&llm, config).await?;
    PlanExecuteAgent::from_config(config)
}

/// `planexec run <objective>`
pub async fn run_objective(config: &Config, objective: &str) -> Result<RunOutcome> {
    let agent = build_agent(config).await?;
    Ok(agent.run(objective).await)
}

/// `planexec workflow run <id>`
pub async fn run_workflow(config: &Config, store: Arc<dyn WorkflowStore>, id: &str) -> Result<RunOutcome> {
    let agent = Arc::new(build_agent(config).await?);
    WorkflowRunner::new(agent, store).run(id).await
}

pub fn render_outcome(outcome: &RunOutcome, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(outcome)?);
    }

    let mut out = String::new();
    if !outcome.history.is_empty() {
        out.push_str("Steps:\n");
        let steps: Vec<&str> = outcome.history.iter().map(|r| r.step.as_str()).collect();
        out.push_str(&format_plan(&steps));
        out.push_str("\n\n");
    }
    out.push_str(&outcome.response_text);
    if let Some(message) = outcome.error_message() {
        out.push_str(&format!("\n\n[{}] {}", if outcome.success { "note" } else { "incomplete" }, message));
    }
    Ok(out)
}

pub fn render_summaries(summaries: &[WorkflowSummary]) -> String {
    if summaries.is_empty() {
        return "No workflows saved.".to_string();
    }
    summaries
        .iter()
        .map(|s| {
            let updated = s.updated_at.as_deref().unwrap_or("-");
            if s.description.is_empty() {
                format!("{}  {}  (updated {})", s.id, s.name, updated)
            } else {
                format!("{}  {}  (updated {})\n    {}", s.id, s.name, updated, s.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_log(log: &ExecutionLog) -> String {
    let mut out = format!(
        "Workflow: {}\nStarted:  {}\nFinished: {}\nDuration: {:.1}s\nSuccess:  {}\n\n{}",
        log.workflow_name,
        log.start_time,
        log.end_time,
        log.duration_seconds,
        if log.success { "yes" } else { "no" },
        log.result
    );
    if let Some(error) = &log.error {
        out.push_str(&format!("\n\nError: {}", error));
    }
    out
}

pub async fn list_workflows(store: &dyn WorkflowStore, json: bool) -> Result<String> {
    let summaries = store.list().await?;
    if json {
        return Ok(serde_json::to_string_pretty(&summaries)?);
    }
    Ok(render_summaries(&summaries))
}

pub async fn show_workflow(store: &dyn WorkflowStore, id: &str) -> Result<String> {
    let workflow = store.load(id).await?;
    Ok(serde_json::to_string_pretty(&workflow)?)
}

pub async fn save_workflow(store: &dyn WorkflowStore, file: &Path, id: Option<&str>) -> Result<String> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| PlanexecError::with_context(format!("Failed to read {}", file.display()), e))?;
    let id = store.save(&bytes, id).await?;
    Ok(format!("Saved workflow '{}'", id))
}

pub async fn rename_workflow(store: &dyn WorkflowStore, id: &str, name: &str) -> Result<String> {
    if store.rename(id, name).await? {
        Ok(format!("Renamed '{}' to '{}'", id, name))
    } else {
        Err(PlanexecError::WorkflowNotFound(id.to_string()))
    }
}

pub async fn delete_workflow(store: &dyn WorkflowStore, id: &str) -> Result<String> {
    if store.delete(id).await? {
        Ok(format!("Deleted workflow '{}'", id))
    } else {
        Err(PlanexecError::WorkflowNotFound(id.to_string()))
    }
}

pub async fn last_log(store: &dyn WorkflowStore, id: &str, json: bool) -> Result<String> {
    // Unknown ids are reported as such, not as "no runs yet"
    store.load(id).await?;
    match store.latest_execution_log(id).await? {
        Some(log) if json => Ok(serde_json::to_string_pretty(&log)?),
        Some(log) => Ok(render_log(&log)),
        None => Ok(format!("Workflow '{}' has not been run yet.", id)),
    }
}

/// `planexec config`
pub fn show_config(config: &Config) -> String {
    format!(
        "planexec configuration\n\
         ─────────────────────────────\n\
         Config file:  {}\n\
         Ollama:       {}\n\
         Planner:      {}\n\
         Executor:     {}\n\
         Assessor:     {}\n\
         Max replans:  {}\n\
         Max steps:    {}\n\
         Web search:   {}\n\
         Workflows:    {}",
        Config::config_file().display(),
        config.ollama_url(),
        config.models.planner,
        config.models.executor,
        config.models.assessor,
        config.agent.max_replans,
        config.agent.max_steps,
        if config.search.api_key.is_some() { "enabled" } else { "disabled (TAVILY_API_KEY not set)" },
        config.workflows_file().display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ExecutionState, Termination};
    use crate::workflow::InMemoryWorkflowStore;

    fn outcome() -> RunOutcome {
        let mut state = ExecutionState::new("What is 2+2?");
        state.set_plan(vec!["compute 2+2".to_string()]).unwrap();
        state.complete_step("4").unwrap();
        state.set_response("4").unwrap();
        state.into_outcome(Termination::Satisfied, None)
    }

    #[test]
    fn test_render_outcome_text() {
        let text = render_outcome(&outcome(), false).unwrap();
        assert!(text.starts_with("Steps:\n1. compute 2+2"));
        assert!(text.ends_with("4"));
    }

    #[test]
    fn test_render_outcome_json() {
        let text = render_outcome(&outcome(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["termination"], "satisfied");
    }

    #[tokio::test]
    async fn test_rename_unknown_is_not_found() {
        let store = InMemoryWorkflowStore::new();
        let err = rename_workflow(&store, "nope", "x").await.unwrap_err();
        assert!(matches!(err, PlanexecError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_last_log_before_any_run() {
        let store = InMemoryWorkflowStore::new();
        let id = store
            .save(br#"{"metadata": {"name": "wf"}, "nodes": [{"id": "a", "type": "act", "prompt": "p"}]}"#, None)
            .await
            .unwrap();
        let text = last_log(&store, &id, false).await.unwrap();
        assert!(text.contains("has not been run yet"));
        assert_eq!(render_summaries(&[]), "No workflows saved.");
    }
}

//! Workflow storage
//!
//! Workflows and their execution logs live in one JSON document. The file
//! store keeps it in memory behind a lock and rewrites the file (temp file,
//! then rename) after every change. A change becomes visible only once the
//! file write succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::core::{PlanexecError, Result};
use crate::workflow::definition::{derive_id, WorkflowDefinition};
use crate::workflow::log::ExecutionLog;

/// Listing entry for one stored workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load a workflow; `WorkflowNotFound` when the id is unknown
    async fn load(&self, id: &str) -> Result<WorkflowDefinition>;

    /// Validate and store a workflow document, returning its id.
    ///
    /// Without an explicit id the id is derived from the workflow name, so
    /// saving a workflow with the same name replaces the earlier one.
    async fn save(&self, document: &[u8], id: Option<&str>) -> Result<String>;

    /// All workflows, most recently updated first
    async fn list(&self) -> Result<Vec<WorkflowSummary>>;

    /// Returns false when the id is unknown
    async fn rename(&self, id: &str, name: &str) -> Result<bool>;

    /// Remove a workflow and its logs; false when the id is unknown
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn append_execution_log(&self, id: &str, log: ExecutionLog) -> Result<()>;

    async fn latest_execution_log(&self, id: &str) -> Result<Option<ExecutionLog>>;
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// Everything the store holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Catalog {
    #[serde(default)]
    workflows: BTreeMap<String, WorkflowDefinition>,
    #[serde(default)]
    logs: BTreeMap<String, Vec<ExecutionLog>>,
}

impl Catalog {
    fn load(&self, id: &str) -> Result<WorkflowDefinition> {
        self.workflows
            .get(id)
            .cloned()
            .ok_or_else(|| PlanexecError::WorkflowNotFound(id.to_string()))
    }

    fn save(&mut self, document: &[u8], id: Option<&str>) -> Result<String> {
        let mut workflow = WorkflowDefinition::from_slice(document)?;
        workflow.validate()?;

        let id = match id.map(str::trim).filter(|i| !i.is_empty()) {
            Some(id) => id.to_string(),
            None => derive_id(&workflow.metadata.name),
        };

        let now = now_string();
        let created_at = self
            .workflows
            .get(&id)
            .and_then(|existing| existing.created_at.clone())
            .or(workflow.created_at.take())
            .unwrap_or_else(|| now.clone());

        workflow.id = id.clone();
        workflow.created_at = Some(created_at);
        workflow.updated_at = Some(now);
        self.workflows.insert(id.clone(), workflow);
        Ok(id)
    }

    fn list(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .values()
            .map(|wf| WorkflowSummary {
                id: wf.id.clone(),
                name: wf.metadata.name.clone(),
                description: wf.describe(),
                created_at: wf.created_at.clone(),
                updated_at: wf.updated_at.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    fn rename(&mut self, id: &str, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(PlanexecError::InvalidWorkflow("name must not be empty".to_string()));
        }
        match self.workflows.get_mut(id) {
            Some(workflow) => {
                workflow.metadata.name = name.trim().to_string();
                workflow.updated_at = Some(now_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&mut self, id: &str) -> bool {
        self.logs.remove(id);
        self.workflows.remove(id).is_some()
    }

    fn append_log(&mut self, id: &str, log: ExecutionLog) -> Result<()> {
        if !self.workflows.contains_key(id) {
            return Err(PlanexecError::WorkflowNotFound(id.to_string()));
        }
        self.logs.entry(id.to_string()).or_default().push(log);
        Ok(())
    }

    fn latest_log(&self, id: &str) -> Option<ExecutionLog> {
        self.logs.get(id).and_then(|logs| logs.last()).cloned()
    }
}

/// Store backed by a single JSON file
#[derive(Clone)]
pub struct FileWorkflowStore {
    path: PathBuf,
    catalog: Arc<RwLock<Catalog>>,
}

impl FileWorkflowStore {
    /// Open the store at `path`, creating the parent directory if needed.
    ///
    /// A missing file is an empty store; an unreadable one is an error so it
    /// is never overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                PlanexecError::store(format!("Failed to create store dir {}: {}", parent.display(), e))
            })?;
        }

        let catalog = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Catalog::default(),
            Ok(bytes) => serde_json::from_slice::<Catalog>(&bytes).map_err(|e| {
                PlanexecError::store(format!("Failed to parse workflow store {}: {}", path.display(), e))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Catalog::default(),
            Err(err) => {
                return Err(PlanexecError::store(format!(
                    "Failed to read workflow store {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        tracing::debug!(path = %path.display(), workflows = catalog.workflows.len(), "workflow store opened");

        Ok(Self {
            path,
            catalog: Arc::new(RwLock::new(catalog)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, catalog: &Catalog) -> Result<()> {
        let data = serde_json::to_vec_pretty(catalog)
            .map_err(|e| PlanexecError::store(format!("Failed to serialize workflow store: {}", e)))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| PlanexecError::store(format!("Failed to write workflow store: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PlanexecError::store(format!("Failed to finalize workflow store: {}", e)))?;
        Ok(())
    }

    /// Apply `change` to a copy of the catalog and keep it only if it was
    /// written to disk. `change` returns whether anything changed.
    async fn commit<T>(&self, change: impl FnOnce(&mut Catalog) -> Result<(T, bool)>) -> Result<T> {
        let mut catalog = self.catalog.write().await;
        let mut next = catalog.clone();
        let (value, changed) = change(&mut next)?;
        if changed {
            self.write_file(&next).await?;
            *catalog = next;
        }
        Ok(value)
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn load(&self, id: &str) -> Result<WorkflowDefinition> {
        self.catalog.read().await.load(id)
    }

    async fn save(&self, document: &[u8], id: Option<&str>) -> Result<String> {
        let id = self
            .commit(|catalog| catalog.save(document, id).map(|id| (id, true)))
            .await?;
        tracing::info!(%id, "workflow saved");
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>> {
        Ok(self.catalog.read().await.list())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<bool> {
        self.commit(|catalog| catalog.rename(id, name).map(|renamed| (renamed, renamed)))
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.commit(|catalog| {
            let deleted = catalog.delete(id);
            Ok((deleted, deleted))
        })
        .await
    }

    async fn append_execution_log(&self, id: &str, log: ExecutionLog) -> Result<()> {
        self.commit(|catalog| catalog.append_log(id, log).map(|()| ((), true)))
            .await
    }

    async fn latest_execution_log(&self, id: &str) -> Result<Option<ExecutionLog>> {
        Ok(self.catalog.read().await.latest_log(id))
    }
}

/// Non-persistent store
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    catalog: RwLock<Catalog>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn load(&self, id: &str) -> Result<WorkflowDefinition> {
        self.catalog.read().await.load(id)
    }

    async fn save(&self, document: &[u8], id: Option<&str>) -> Result<String> {
        self.catalog.write().await.save(document, id)
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>> {
        Ok(self.catalog.read().await.list())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<bool> {
        self.catalog.write().await.rename(id, name)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.catalog.write().await.delete(id))
    }

    async fn append_execution_log(&self, id: &str, log: ExecutionLog) -> Result<()> {
        self.catalog.write().await.append_log(id, log)
    }

    async fn latest_execution_log(&self, id: &str) -> Result<Option<ExecutionLog>> {
        Ok(self.catalog.read().await.latest_log(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"{"metadata": {"name": "Queen Facts"}, "nodes": [{"id": "n1", "type": "act", "prompt": "Who's the queen?"}]}"#;

    fn log(result: &str) -> ExecutionLog {
        ExecutionLog {
            workflow_name: "Queen Facts".to_string(),
            start_time: now_string(),
            end_time: now_string(),
            duration_seconds: 1.0,
            success: true,
            result: result.to_string(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_save_derives_id_and_timestamps() {
        let store = InMemoryWorkflowStore::new();
        let id = store.save(DOC, None).await.unwrap();
        assert_eq!(id, "Queen_Facts");

        let wf = store.load(&id).await.unwrap();
        assert_eq!(wf.id, "Queen_Facts");
        assert!(wf.created_at.is_some());
        assert_eq!(wf.objective(), Some("Who's the queen?"));
    }

    #[tokio::test]
    async fn test_resave_keeps_created_at() {
        let store = InMemoryWorkflowStore::new();
        let id = store.save(DOC, Some("facts")).await.unwrap();
        let first = store.load(&id).await.unwrap();
        store.save(DOC, Some("facts")).await.unwrap();
        let second = store.load(&id).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected() {
        let store = InMemoryWorkflowStore::new();
        let err = store
            .save(br#"{"metadata": {"name": ""}, "nodes": []}"#, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanexecError::InvalidWorkflow(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_delete_unknown() {
        let store = InMemoryWorkflowStore::new();
        assert!(!store.rename("missing", "x").await.unwrap());
        assert!(!store.delete("missing").await.unwrap());
        assert!(matches!(
            store.load("missing").await,
            Err(PlanexecError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_logs_latest_and_removed_with_workflow() {
        let store = InMemoryWorkflowStore::new();
        let id = store.save(DOC, None).await.unwrap();
        assert!(store.latest_execution_log(&id).await.unwrap().is_none());

        store.append_execution_log(&id, log("first")).await.unwrap();
        store.append_execution_log(&id, log("second")).await.unwrap();
        let latest = store.latest_execution_log(&id).await.unwrap().unwrap();
        assert_eq!(latest.result, "second");

        assert!(store.delete(&id).await.unwrap());
        assert!(store.latest_execution_log(&id).await.unwrap().is_none());
        assert!(store.append_execution_log(&id, log("third")).await.is_err());
    }
}

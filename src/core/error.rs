//! Custom error types for planexec
//!
//! Provides a unified error handling system across all modules.

use std::time::Duration;

use thiserror::Error;

/// Main error type for planexec operations
#[derive(Error, Debug)]
pub enum PlanexecError {
    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// Search API errors
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Planner call failed or returned an unusable plan
    #[error("Planning failed: {0}")]
    Planning(String),

    /// Goal assessor call failed or returned malformed output
    #[error("Assessment failed: {0}")]
    Assessment(String),

    /// Workflow store read or write failed
    #[error("Store error: {0}")]
    Store(String),

    /// No workflow with the given id
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// Workflow document failed validation
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A delegated call exceeded its time budget
    #[error("{operation} timed out after {budget:?}")]
    Timeout { operation: String, budget: Duration },

    /// The run response was assigned twice
    #[error("Run response already set")]
    ResponseAlreadySet,

    /// Ollama not reachable at startup
    #[error("Cannot reach Ollama at {0}. Start it with: ollama serve")]
    OllamaNotReachable(String),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for planexec operations
pub type Result<T> = std::result::Result<T, PlanexecError>;

impl PlanexecError {
    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create a search error
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a planning error
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning(msg.into())
    }

    /// Create an assessment error
    pub fn assessment(msg: impl Into<String>) -> Self {
        Self::Assessment(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget,
        }
    }

    /// Wrap an error with additional context
    pub fn with_context<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Whether this error came from the workflow store
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Io(_))
    }
}

//! Workflow module - stored workflows, execution logs and the runner

pub mod definition;
pub mod log;
pub mod runner;
pub mod store;

pub use definition::{derive_id, Connection, Endpoint, Metadata, Node, NodeKind, WorkflowDefinition};
pub use log::ExecutionLog;
pub use runner::WorkflowRunner;
pub use store::{FileWorkflowStore, InMemoryWorkflowStore, WorkflowStore, WorkflowSummary};

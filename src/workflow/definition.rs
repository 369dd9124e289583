//! Workflow definitions
//!
//! A workflow is a graph of typed nodes authored elsewhere. Only the first
//! action node's prompt matters to a run; the rest is carried through storage
//! unchanged.

use serde::{Deserialize, Serialize};

use crate::core::{PlanexecError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[serde(alias = "action")]
    Act,
    Choice,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// One side of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// Anchor on the node ("top", "bottom", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// A stored workflow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl WorkflowDefinition {
    /// Parse document bytes; JSON first, then YAML
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice(bytes) {
            Ok(definition) => Ok(definition),
            Err(json_err) => serde_yaml::from_slice(bytes).map_err(|yaml_err| {
                PlanexecError::InvalidWorkflow(format!(
                    "not valid JSON ({}) or YAML ({})",
                    json_err, yaml_err
                ))
            }),
        }
    }

    /// Workflows need a name, and every action node needs a prompt
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(PlanexecError::InvalidWorkflow(
                "metadata.name is required".to_string(),
            ));
        }
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Act && n.prompt_text().is_none())
        {
            return Err(PlanexecError::InvalidWorkflow(format!(
                "action node '{}' has no prompt",
                node.id
            )));
        }
        Ok(())
    }

    /// Prompt of the first action node, used as the run objective
    pub fn objective(&self) -> Option<&str> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Act)
            .find_map(Node::prompt_text)
    }

    /// Metadata description, else the first node content
    pub fn describe(&self) -> String {
        self.metadata
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| {
                self.nodes
                    .iter()
                    .filter_map(|n| n.content.as_deref())
                    .find(|c| !c.trim().is_empty())
            })
            .unwrap_or_default()
            .to_string()
    }
}

/// Id used when a workflow is saved without one
pub fn derive_id(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

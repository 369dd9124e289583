//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to handlers.
//! Every failure is turned into a failed [`ToolResult`] here, so nothing a tool
//! does can abort the agent loop that called it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{ToolCall, ToolDefinition, ToolResult};
use crate::tools::search::{format_hits, SearchProvider};

/// Name the search tool is exposed under
pub const SEARCH_TOOL: &str = "search";

/// Registry of available tools
pub struct ToolRegistry {
    /// Tool definitions indexed by name
    definitions: BTreeMap<String, ToolDefinition>,
    /// Search backend, if one is configured
    search: Option<Arc<dyn SearchProvider>>,
    /// Hits requested when the model does not ask for a count
    default_results: usize,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            definitions: BTreeMap::new(),
            search: None,
            default_results: 5,
        }
    }

    /// Create a registry exposing the given search provider
    pub fn with_search(provider: Arc<dyn SearchProvider>, default_results: usize) -> Self {
        let mut registry = Self::new();
        registry.search = Some(provider);
        registry.default_results = default_results.max(1);
        registry.register_search_tool();
        registry
    }

    fn register_search_tool(&mut self) {
        self.register(ToolDefinition::function(
            SEARCH_TOOL,
            "Search the web for up-to-date information. Returns ranked results with title, URL and snippet.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (default: 5, max: 10)"
                    }
                },
                "required": ["query"]
            }),
        ));
    }

    /// Register a tool definition
    pub fn register(&mut self, definition: ToolDefinition) {
        let name = definition.function.name.clone();
        self.definitions.insert(name, definition);
    }

    /// Get all tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.values().cloned().collect()
    }

    /// "name: description" lines for prompts
    pub fn describe(&self) -> String {
        self.definitions
            .values()
            .map(ToolDefinition::summary_line)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Check if no tools are registered
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Execute a tool call, reporting failures as observations
    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        match tool_call.name.as_str() {
            SEARCH_TOOL => self.execute_search(tool_call).await,
            _ => ToolResult::failure(
                &tool_call.name,
                format!("Unknown tool: {}", tool_call.name),
            ),
        }
    }

    async fn execute_search(&self, tool_call: &ToolCall) -> ToolResult {
        let Some(provider) = self.search.as_ref() else {
            return ToolResult::failure(SEARCH_TOOL, "Search is not configured");
        };

        let query = match tool_call.get_string("query") {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::failure(SEARCH_TOOL, "Missing 'query' argument"),
        };
        let limit = tool_call
            .get_u64("max_results")
            .map(|n| n as usize)
            .unwrap_or(self.default_results)
            .clamp(1, 10);

        match provider.search(&query, limit).await {
            Ok(hits) => {
                tracing::debug!(provider = provider.name(), %query, hits = hits.len(), "search complete");
                let data = serde_json::to_value(&hits).unwrap_or_default();
                ToolResult::success_with_data(SEARCH_TOOL, format_hits(&query, &hits), data)
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), %query, "search failed: {}", e);
                ToolResult::failure(SEARCH_TOOL, format!("Search failed: {}", e))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

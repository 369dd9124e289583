//! Tools module - Tool implementations for the agent
//!
//! Contains the web search adapter and the tool registry.

pub mod registry;
pub mod search;

pub use registry::{ToolRegistry, SEARCH_TOOL};
pub use search::{SearchHit, SearchProvider, TavilySearch};

//! LLM module - Language Model integrations
//!
//! Provides the provider abstraction, the Ollama backend, and helpers for
//! schema-constrained replies.

pub mod ollama;
pub mod structured;
pub mod traits;

pub use ollama::OllamaClient;
pub use structured::{parse_structured, request_structured};
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

//! Chat-completions client used by the sensei agent runtime.
//!
//! Pure HTTP client against any OpenAI-compatible endpoint.

mod client;
mod error;
mod types;

pub use client::{DEFAULT_API_BASE_URL, LlmClient, validate_tool_name};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};

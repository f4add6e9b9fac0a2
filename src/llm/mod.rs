//! Text-generation integration.
//!
//! - `provider`: provider-neutral request/response types and the trait
//! - `openai_chat`: OpenAI-compatible Chat Completions backend
//! - `json`: recovery of structured data from generated text
//! - `reasoning`: one tool-calling step of the agent loop
//! - `structured`: single-shot instruction + payload → typed value

pub mod json;
mod openai_chat;
mod provider;
mod reasoning;
mod structured;

pub use openai_chat::OpenAiChatProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};
pub use reasoning::{Reasoning, ReasoningContext, RespondResult, clean_response, strip_thinking_tags};
pub use structured::{GenerationParams, StructuredClient};

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create the configured provider.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::info!(
        base_url = %config.base_url,
        model = %config.model,
        light_model = config.light_model.as_deref().unwrap_or("-"),
        "Using OpenAI-compatible Chat Completions provider"
    );
    Ok(Arc::new(OpenAiChatProvider::new(config.clone())?))
}

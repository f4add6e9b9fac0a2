//! One reasoning step of the agent: send the transcript, get text or tool calls.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition};

/// Context for one reasoning step.
#[derive(Debug, Clone, Default)]
pub struct ReasoningContext {
    /// System instruction, prepended to every request.
    pub system_prompt: String,
    /// Transcript so far (without the system message).
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call.
    pub available_tools: Vec<ToolDefinition>,
}

impl ReasoningContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.available_tools = tools;
        self
    }
}

/// Result of a response with potential tool calls.
#[derive(Debug, Clone)]
pub enum RespondResult {
    /// Final prose for the user.
    Text(String),
    /// The model wants tools run. `content` is any prose it wrote alongside.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Reasoning engine for the agent loop.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            temperature: 0.4,
            max_tokens: 2048,
        }
    }

    /// Generate a response that may include tool calls.
    ///
    /// The whole request is bounded by the configured timeout; exceeding it
    /// yields [`LlmError::Timeout`].
    pub async fn respond_with_tools(
        &self,
        context: &ReasoningContext,
    ) -> Result<RespondResult, LlmError> {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        messages.push(ChatMessage::system(context.system_prompt.clone()));
        messages.extend(context.messages.iter().cloned());

        let request = ToolCompletionRequest::new(messages, context.available_tools.clone())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_tool_choice("auto");

        let response = tokio::time::timeout(self.timeout, self.llm.complete_with_tools(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout: self.timeout,
            })??;

        let content = response
            .content
            .map(|c| clean_response(&c))
            .filter(|c| !c.is_empty());

        if !response.tool_calls.is_empty() {
            return Ok(RespondResult::ToolCalls {
                content,
                calls: response.tool_calls,
            });
        }

        Ok(RespondResult::Text(content.unwrap_or_default()))
    }
}

/// Clean up model prose before it reaches the user.
pub fn clean_response(text: &str) -> String {
    strip_thinking_tags(text)
}

static THINKING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<thinking>.*?(?:</thinking>|\z)").expect("valid regex")
});
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Remove `<thinking>` blocks. An unclosed block runs to the end of the text.
pub fn strip_thinking_tags(text: &str) -> String {
    let without = THINKING_BLOCK.replace_all(text, "");
    BLANK_RUN.replace_all(without.trim(), "\n\n").into_owned()
}

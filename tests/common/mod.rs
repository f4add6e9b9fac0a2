//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use eventide::assistant::{Assistant, AssistantDeps};
use eventide::clock::{Clock, ManualClock};
use eventide::config::Config;
use eventide::context::InMemoryConversationStore;
use eventide::error::LlmError;
use eventide::llm::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use eventide::notify::LogNotifier;
use eventide::rate_limit::RateLimiter;
use eventide::store::InMemoryStore;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

type Step = Box<dyn Fn(&[ChatMessage]) -> ToolCompletionResponse + Send + Sync>;

/// Provider that plays back a script. Each step sees the messages sent so far.
#[derive(Default)]
pub struct ScriptedProvider {
    tool_steps: Mutex<VecDeque<Step>>,
    completions: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: impl Fn(&[ChatMessage]) -> ToolCompletionResponse + Send + Sync + 'static) -> Self {
        self.tool_steps.lock().unwrap().push_back(Box::new(step));
        self
    }

    pub fn then_call(self, name: &'static str, arguments: serde_json::Value) -> Self {
        self.then(move |_| call(name, arguments.clone()))
    }

    pub fn then_say(self, text: &'static str) -> Self {
        self.then(move |_| say(text))
    }

    /// Queue a plain completion (used by the single-shot tools).
    pub fn then_complete(self, content: &str) -> Self {
        self.completions.lock().unwrap().push_back(content.to_string());
        self
    }
}

pub fn call(name: &str, arguments: serde_json::Value) -> ToolCompletionResponse {
    ToolCompletionResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments,
        }],
        finish_reason: FinishReason::ToolUse,
        input_tokens: 0,
        output_tokens: 0,
    }
}

pub fn say(text: &str) -> ToolCompletionResponse {
    ToolCompletionResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        finish_reason: FinishReason::Stop,
        input_tokens: 0,
        output_tokens: 0,
    }
}

fn exhausted() -> LlmError {
    LlmError::RequestFailed {
        provider: "scripted".to_string(),
        reason: "script exhausted".to_string(),
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = self.completions.lock().unwrap().pop_front().ok_or_else(exhausted)?;
        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(req.messages.clone());
        let step = self.tool_steps.lock().unwrap().pop_front().ok_or_else(exhausted)?;
        Ok(step(&req.messages))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct Harness {
    pub assistant: Arc<Assistant>,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(provider: ScriptedProvider) -> Harness {
    harness_with(provider, Config::default())
}

pub fn harness_with(provider: ScriptedProvider, config: Config) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(now()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let deps = AssistantDeps {
        llm: provider.clone(),
        store: store.clone(),
        notifier: Arc::new(LogNotifier),
        memory: Arc::new(InMemoryConversationStore::new(
            config.memory.max_messages,
            Arc::clone(&shared_clock),
        )),
        limiter: Arc::new(RateLimiter::in_memory(config.rate_limit, Arc::clone(&shared_clock))),
        clock: shared_clock,
    };
    Harness {
        assistant: Arc::new(Assistant::new(deps, &config)),
        store,
        provider,
        clock,
    }
}

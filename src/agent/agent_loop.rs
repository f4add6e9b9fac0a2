//! The multi-step reasoning loop.
//!
//! Each turn alternates between asking the model for its next step and
//! dispatching the tool calls it requests, until the model answers in prose
//! or the iteration ceiling is hit. Steps within a turn are strictly
//! sequential.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::agent::prompt::system_prompt;
use crate::agent::turn::{HistoryEntry, ToolTraceEntry, TurnOutcome, TurnReply};
use crate::config::AgentConfig;
use crate::error::AssistantError;
use crate::llm::{ChatMessage, Reasoning, ReasoningContext, RespondResult, ToolCall};
use crate::safety::truncate_output;
use crate::tools::{ToolContext, ToolRegistry};

/// Drives one turn at a time. Holds no per-caller state.
pub struct Agent {
    reasoning: Reasoning,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

/// Accumulated tool activity for one turn.
#[derive(Default)]
struct TurnLog {
    tools_used: Vec<String>,
    trace: Vec<ToolTraceEntry>,
    affected: Vec<Uuid>,
    last_prose: Option<String>,
}

impl TurnLog {
    fn note_affected(&mut self, ids: &[Uuid]) {
        for id in ids {
            if !self.affected.contains(id) {
                self.affected.push(*id);
            }
        }
    }

    /// Best answer available when the loop stops early.
    fn partial_reply(&self) -> String {
        if let Some(prose) = &self.last_prose {
            return prose.clone();
        }
        if self.tools_used.is_empty() {
            return "I wasn't able to finish working on that. Could you rephrase or break it \
                    into smaller steps?"
                .to_string();
        }
        let mut unique: Vec<&str> = Vec::new();
        for name in &self.tools_used {
            if !unique.contains(&name.as_str()) {
                unique.push(name);
            }
        }
        format!(
            "I ran out of steps before finishing. So far I used: {}. Let me know how you'd \
             like to continue.",
            unique.join(", ")
        )
    }

    fn into_reply(self, reply: String, outcome: TurnOutcome, iterations: usize) -> TurnReply {
        TurnReply {
            reply,
            tools_used: self.tools_used,
            tool_trace: self.trace,
            affected_event_ids: self.affected,
            outcome,
            iterations,
        }
    }
}

impl Agent {
    pub fn new(reasoning: Reasoning, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            reasoning,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn.
    ///
    /// Only the most recent `history_window` entries of `history` are sent.
    /// Tool failures are fed back to the model as `Error: ...` results and do
    /// not end the turn; completion failures do.
    pub async fn run_turn(
        &self,
        ctx: &ToolContext,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<TurnReply, AssistantError> {
        let window_start = history.len().saturating_sub(self.config.history_window);
        let mut messages: Vec<ChatMessage> = history[window_start..]
            .iter()
            .map(HistoryEntry::to_chat_message)
            .collect();
        messages.push(ChatMessage::user(message));

        let mut context =
            ReasoningContext::new(system_prompt(&ctx.identity, ctx.now, &self.tools))
                .with_messages(messages)
                .with_tools(self.tools.definitions());

        let mut log = TurnLog::default();

        for iteration in 1..=self.config.max_iterations {
            tracing::debug!(caller_id = %ctx.subject_id(), iteration, "Reasoning step");

            let step = self.reasoning.respond_with_tools(&context).await.map_err(|e| {
                tracing::error!(
                    caller_id = %ctx.subject_id(),
                    iteration,
                    error = %e,
                    "Completion failed, aborting turn"
                );
                AssistantError::from(e)
            })?;

            match step {
                RespondResult::Text(text) => {
                    let reply = if text.trim().is_empty() {
                        log.partial_reply()
                    } else {
                        text
                    };
                    tracing::info!(
                        caller_id = %ctx.subject_id(),
                        iterations = iteration,
                        tools = log.tools_used.len(),
                        "Turn complete"
                    );
                    return Ok(log.into_reply(reply, TurnOutcome::Done, iteration));
                }
                RespondResult::ToolCalls { content, calls } => {
                    if content.is_some() {
                        log.last_prose.clone_from(&content);
                    }
                    context.messages.push(ChatMessage::assistant_with_tool_calls(
                        content.unwrap_or_default(),
                        calls.clone(),
                    ));
                    for call in &calls {
                        let result = self.run_tool(call, ctx, &mut log).await;
                        context
                            .messages
                            .push(ChatMessage::tool_result(&call.id, &call.name, result));
                    }
                }
            }
        }

        tracing::warn!(
            caller_id = %ctx.subject_id(),
            max_iterations = self.config.max_iterations,
            tools = ?log.tools_used,
            "Iteration ceiling reached, returning partial answer"
        );
        let reply = log.partial_reply();
        Ok(log.into_reply(reply, TurnOutcome::Aborted, self.config.max_iterations))
    }

    /// Dispatch one call and record it. Returns the content fed back to the model.
    async fn run_tool(&self, call: &ToolCall, ctx: &ToolContext, log: &mut TurnLog) -> String {
        let started = Instant::now();
        let result = self
            .tools
            .dispatch(&call.name, call.arguments.clone(), ctx)
            .await;

        let (content, success) = match result {
            Ok(output) => {
                log.note_affected(&output.affected_event_ids);
                (output.to_content(), true)
            }
            Err(e) => (format!("Error: {}", e), false),
        };

        log.tools_used.push(call.name.clone());
        log.trace.push(ToolTraceEntry {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            output: truncate_output(&content, self.config.trace_output_limit),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        content
    }
}

//! Per-turn input and output types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ConversationMessage, ConversationRole};
use crate::llm::ChatMessage;

/// A prior message supplied with a turn: role and text, no tool traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: ConversationRole,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            text: text.into(),
        }
    }

    pub(crate) fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            ConversationRole::User => ChatMessage::user(&self.text),
            ConversationRole::Assistant => ChatMessage::assistant(&self.text),
        }
    }
}

impl From<&ConversationMessage> for HistoryEntry {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            text: message.text.clone(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    /// The model produced a final answer.
    Done,
    /// The iteration ceiling was hit; the reply is the best partial answer.
    Aborted,
}

/// One tool invocation as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTraceEntry {
    pub tool: String,
    pub arguments: serde_json::Value,
    /// Serialized result, or `Error: ...`, truncated for transport.
    pub output: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// Result of one agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    /// Never empty.
    pub reply: String,
    /// Tool names in invocation order, repeats included.
    pub tools_used: Vec<String>,
    pub tool_trace: Vec<ToolTraceEntry>,
    /// Events created or changed during the turn, first mention first.
    pub affected_event_ids: Vec<Uuid>,
    pub outcome: TurnOutcome,
    pub iterations: usize,
}

impl TurnReply {
    pub fn is_done(&self) -> bool {
        self.outcome == TurnOutcome::Done
    }
}

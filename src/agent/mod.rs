//! Core agent logic.
//!
//! The agent turns one caller message into a reply by alternating between
//! model reasoning and tool dispatch:
//! - `agent_loop`: the bounded reasoning/tool loop
//! - `prompt`: the per-turn system prompt
//! - `turn`: turn input and output types

mod agent_loop;
mod prompt;
mod turn;

pub use agent_loop::Agent;
pub use prompt::system_prompt;
pub use turn::{HistoryEntry, ToolTraceEntry, TurnOutcome, TurnReply};

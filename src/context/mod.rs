//! Per-user conversation state.
//!
//! Each caller has a bounded message log that seeds the agent loop when a
//! turn arrives without explicit prior history.

mod memory;

pub use memory::{
    ConversationMessage, ConversationRole, ConversationStore, InMemoryConversationStore,
};

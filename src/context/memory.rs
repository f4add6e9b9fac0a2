//! Bounded per-user conversation logs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::clock::Clock;
use crate::error::StoreError;

/// Who produced a stored message. Tool traces are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub text: String,
    /// Monotonic per-user sequence number. Survives eviction, so gaps at the
    /// front show how much was dropped.
    #[serde(default)]
    pub seq: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ConversationRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ConversationRole::Assistant, text)
    }

    fn new(role: ConversationRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            seq: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Append-only per-user message log with FIFO eviction.
///
/// Contract for implementations:
/// - `append` is serialized per user: concurrent appends for the same user
///   never lose messages, and the stored sequence never exceeds the cap.
/// - Appends for different users are independent.
/// - `history` returns messages oldest first.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append messages in order, assigning sequence numbers and timestamps.
    async fn append(
        &self,
        user_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), StoreError>;

    async fn history(&self, user_id: &str) -> Result<Vec<ConversationMessage>, StoreError>;

    /// Remove every message for the user. Returns how many were removed.
    async fn clear(&self, user_id: &str) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
struct Log {
    messages: VecDeque<ConversationMessage>,
    next_seq: u64,
}

type SharedLog = Arc<Mutex<Log>>;

/// Process-local logs, one lock per user.
pub struct InMemoryConversationStore {
    logs: RwLock<HashMap<String, SharedLog>>,
    max_messages: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryConversationStore {
    pub fn new(max_messages: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
            clock,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    async fn log(&self, user_id: &str) -> SharedLog {
        // Fast path: log exists
        {
            let logs = self.logs.read().await;
            if let Some(log) = logs.get(user_id) {
                return Arc::clone(log);
            }
        }

        let mut logs = self.logs.write().await;
        Arc::clone(logs.entry(user_id.to_string()).or_default())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        user_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let log = self.log(user_id).await;
        let mut log = log.lock().await;
        let now = self.clock.now();

        for mut message in messages {
            message.seq = log.next_seq;
            message.created_at = now;
            log.next_seq += 1;
            log.messages.push_back(message);
        }
        let excess = log.messages.len().saturating_sub(self.max_messages);
        if excess > 0 {
            log.messages.drain(..excess);
            tracing::debug!(user_id, evicted = excess, "Evicted oldest conversation messages");
        }
        Ok(())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<ConversationMessage>, StoreError> {
        let log = {
            let logs = self.logs.read().await;
            match logs.get(user_id) {
                Some(log) => Arc::clone(log),
                None => return Ok(Vec::new()),
            }
        };
        let log = log.lock().await;
        Ok(log.messages.iter().cloned().collect())
    }

    async fn clear(&self, user_id: &str) -> Result<usize, StoreError> {
        let log = {
            let logs = self.logs.read().await;
            match logs.get(user_id) {
                Some(log) => Arc::clone(log),
                None => return Ok(0),
            }
        };
        // Keep the entry: an append may already hold this log.
        let mut log = log.lock().await;
        let removed = log.messages.len();
        log.messages.clear();
        Ok(removed)
    }
}

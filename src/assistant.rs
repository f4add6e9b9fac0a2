//! The core-facing assistant interface.
//!
//! Wraps the agent loop with the pieces every caller-facing surface needs:
//! rate limiting, input validation, history seeding and persistence.

use std::sync::Arc;

use serde::Deserialize;

use crate::agent::{Agent, HistoryEntry, TurnReply};
use crate::auth::Identity;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::context::{ConversationMessage, ConversationStore, InMemoryConversationStore};
use crate::error::AssistantError;
use crate::llm::{LlmProvider, Reasoning, StructuredClient};
use crate::notify::{LogNotifier, Notifier};
use crate::rate_limit::{RateLimiter, Tier};
use crate::safety::Validator;
use crate::store::{InMemoryStore, RecordStore};
use crate::tools::builtin::{
    Agenda, AgendaRequest, MeetingSuggestions, SuggestRequest, ToolServices, generate_agenda,
    register_builtin_tools, suggest_slots,
};
use crate::tools::{ToolContext, ToolRegistry};

/// Input to [`Assistant::run_turn`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,
    /// Prior turns supplied by the caller. When absent the stored
    /// conversation is used.
    #[serde(default)]
    pub prior_history: Option<Vec<HistoryEntry>>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            prior_history: None,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.prior_history = Some(history);
        self
    }
}

/// Collaborators for an [`Assistant`].
pub struct AssistantDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
    pub memory: Arc<dyn ConversationStore>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl AssistantDeps {
    /// In-memory store, memory and limiter with a log-only notifier.
    pub fn in_memory(llm: Arc<dyn LlmProvider>, config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            llm,
            store: Arc::new(InMemoryStore::new()),
            notifier: Arc::new(LogNotifier),
            memory: Arc::new(InMemoryConversationStore::new(
                config.memory.max_messages,
                Arc::clone(&clock),
            )),
            limiter: Arc::new(RateLimiter::in_memory(config.rate_limit, Arc::clone(&clock))),
            clock,
        }
    }
}

pub struct Assistant {
    agent: Agent,
    services: ToolServices,
    memory: Arc<dyn ConversationStore>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    validator: Validator,
}

impl Assistant {
    pub fn new(deps: AssistantDeps, config: &Config) -> Self {
        let structured = StructuredClient::new(Arc::clone(&deps.llm), config.llm.timeout)
            .with_light_model(config.llm.light_model.clone());
        let services = ToolServices {
            store: deps.store,
            notifier: deps.notifier,
            structured,
            limiter: Arc::clone(&deps.limiter),
            app_base_url: config.notify.app_base_url.clone(),
        };

        let mut registry = ToolRegistry::new(config.agent.tool_timeout);
        register_builtin_tools(&mut registry, &services);
        tracing::info!(tools = ?registry.list(), "Registered tools");

        let agent = Agent::new(
            Reasoning::new(deps.llm, config.llm.timeout),
            Arc::new(registry),
            config.agent.clone(),
        );

        Self {
            agent,
            services,
            memory: deps.memory,
            limiter: deps.limiter,
            clock: deps.clock,
            validator: Validator::new(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.services.store
    }

    async fn check_tier(&self, caller_id: &str, tier: Tier) -> Result<(), AssistantError> {
        self.limiter.check(caller_id, tier).await.into_result()?;
        Ok(())
    }

    /// Run one agent turn for `identity`.
    ///
    /// The turn is persisted to conversation memory only when it completes
    /// normally; aborted and failed turns leave memory untouched.
    pub async fn run_turn(
        &self,
        identity: &Identity,
        request: TurnRequest,
    ) -> Result<TurnReply, AssistantError> {
        let caller_id = identity.subject_id.as_str();
        self.validator
            .validate("message", &request.message)
            .into_result()
            .map_err(AssistantError::ValidationFailed)?;
        self.check_tier(caller_id, Tier::Agent).await?;

        let history = match request.prior_history {
            Some(history) => history,
            None => self
                .memory
                .history(caller_id)
                .await?
                .iter()
                .map(HistoryEntry::from)
                .collect(),
        };

        let ctx = ToolContext::new(identity.clone(), self.clock.now());
        let reply = self
            .agent
            .run_turn(&ctx, request.message.trim(), &history)
            .await?;

        if reply.is_done() {
            let exchange = vec![
                ConversationMessage::user(request.message.trim()),
                ConversationMessage::assistant(reply.reply.clone()),
            ];
            // The reply is already produced; a memory failure only costs context.
            if let Err(e) = self.memory.append(caller_id, exchange).await {
                tracing::error!(caller_id, error = %e, "Failed to persist conversation turn");
            }
        } else {
            tracing::warn!(caller_id, "Turn aborted at iteration ceiling, not persisted");
        }
        Ok(reply)
    }

    pub async fn get_history(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ConversationMessage>, AssistantError> {
        Ok(self.memory.history(&identity.subject_id).await?)
    }

    /// Returns how many messages were removed.
    pub async fn clear_history(&self, identity: &Identity) -> Result<usize, AssistantError> {
        let removed = self.memory.clear(&identity.subject_id).await?;
        tracing::info!(caller_id = %identity.subject_id, removed, "Cleared conversation history");
        Ok(removed)
    }

    /// Draft an agenda outside the agent loop. Uses the cheap tier.
    pub async fn build_agenda(
        &self,
        identity: &Identity,
        request: AgendaRequest,
    ) -> Result<Agenda, AssistantError> {
        request.check()?;
        self.check_tier(&identity.subject_id, Tier::Single).await?;
        Ok(generate_agenda(&self.services.structured, &request).await?)
    }

    /// Suggest meeting times outside the agent loop. Uses the cheap tier.
    pub async fn suggest_times(
        &self,
        identity: &Identity,
        request: SuggestRequest,
    ) -> Result<MeetingSuggestions, AssistantError> {
        request.check()?;
        self.check_tier(&identity.subject_id, Tier::Single).await?;
        Ok(suggest_slots(&self.services, &request, &identity.subject_id).await?)
    }
}

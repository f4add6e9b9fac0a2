//! Tool trait and types.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{AssistantError, FieldError, LlmError, StoreError, join_fields};
use crate::llm::ToolDefinition;

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Malformed generated response: {0}")]
    MalformedResponse(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Duplicate { .. } | StoreError::CapacityExceeded { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::InvalidQuery(_) => Self::ExecutionFailed(err.to_string()),
            StoreError::Unavailable(_) => Self::ExternalService(err.to_string()),
        }
    }
}

impl From<LlmError> for ToolError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MalformedResponse { reason } => Self::MalformedResponse(reason),
            LlmError::InvalidResponse { .. } => Self::MalformedResponse(err.to_string()),
            LlmError::Timeout { timeout, .. } => Self::Timeout(timeout),
            other => Self::ExternalService(other.to_string()),
        }
    }
}

impl From<crate::rate_limit::Denied> for ToolError {
    fn from(denied: crate::rate_limit::Denied) -> Self {
        Self::RateLimited(denied.retry_after_secs)
    }
}

impl From<ToolError> for AssistantError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidParameters(reason) => AssistantError::invalid("params", reason),
            ToolError::Validation(fields) => AssistantError::ValidationFailed(fields),
            ToolError::NotFound(what) => AssistantError::NotFound(what),
            ToolError::Forbidden(why) => AssistantError::Forbidden(why),
            ToolError::Conflict(why) => AssistantError::Conflict(why),
            ToolError::RateLimited(retry_after_secs) => {
                AssistantError::RateLimited { retry_after_secs }
            }
            ToolError::Timeout(after) => {
                AssistantError::UpstreamUnavailable(format!("timed out after {:?}", after))
            }
            ToolError::ExternalService(reason) => AssistantError::UpstreamUnavailable(reason),
            ToolError::MalformedResponse(reason) => AssistantError::MalformedResponse(reason),
            ToolError::ExecutionFailed(reason) => AssistantError::Internal(reason),
        }
    }
}

/// Who is calling a tool, and when.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub identity: Identity,
    pub now: DateTime<Utc>,
}

impl ToolContext {
    pub fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self { identity, now }
    }

    pub fn subject_id(&self) -> &str {
        &self.identity.subject_id
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The result data.
    pub result: serde_json::Value,
    /// Time taken.
    pub duration: Duration,
    /// Events created or changed by this call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_event_ids: Vec<Uuid>,
}

impl ToolOutput {
    /// Create a successful output with a JSON result.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self {
            result,
            duration,
            affected_event_ids: Vec::new(),
        }
    }

    /// Record an event this call created or changed.
    pub fn with_affected(mut self, event_id: Uuid) -> Self {
        if !self.affected_event_ids.contains(&event_id) {
            self.affected_event_ids.push(event_id);
        }
        self
    }

    /// Compact JSON text fed back to the model.
    pub fn to_content(&self) -> String {
        self.result.to_string()
    }
}

/// Trait for tools that the agent can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get a description of what the tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Parameters have already been checked against
    /// [`Tool::parameters_schema`] by the registry.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    /// Whether the agent should get explicit user confirmation first.
    ///
    /// Advisory only: surfaced in the system instruction, not enforced here.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Get the definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Decode validated parameters into a typed struct.
pub fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_affected_dedups() {
        let id = Uuid::new_v4();
        let out = ToolOutput::success(serde_json::json!({}), Duration::ZERO)
            .with_affected(id)
            .with_affected(id);
        assert_eq!(out.affected_event_ids, vec![id]);
    }

    #[test]
    fn test_tool_error_display_is_model_readable() {
        let err = ToolError::Validation(vec![
            FieldError::new("endDateTime", "must be after startDateTime"),
            FieldError::new("title", "must not be empty"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: endDateTime: must be after startDateTime; title: must not be empty"
        );
    }

    #[test]
    fn test_tool_error_maps_into_taxonomy() {
        let err: AssistantError = ToolError::Forbidden("not the owner".to_string()).into();
        assert_eq!(err.status_code(), 403);
        let err: AssistantError = ToolError::RateLimited(60).into();
        assert!(matches!(err, AssistantError::RateLimited { retry_after_secs: 60 }));
        let err: AssistantError = ToolError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(err.code(), "upstream_unavailable");
    }
}

//! Error types for every layer of the assistant.
//!
//! Lower layers (config, LLM provider, record store, notifications, auth)
//! each get their own enum. Everything that crosses the public boundary is
//! folded into [`AssistantError`], which carries the caller-facing taxonomy.

use std::time::Duration;

use serde::Serialize;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub(crate) fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors from the text-generation provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned an invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Generated output could not be parsed: {reason}")]
    MalformedResponse { reason: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Event {event_id} is full ({taken} of {capacity} places taken)")]
    CapacityExceeded {
        event_id: uuid::Uuid,
        taken: usize,
        capacity: u32,
    },

    #[error("Invalid record store query: {0}")]
    InvalidQuery(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery errors. Never fatal to the invoking tool.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Identity verification errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid bearer credential")]
    InvalidCredential,
}

/// Caller-facing error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {}", join_fields(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed generated response: {0}")]
    MalformedResponse(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssistantError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![FieldError::new(field, message)])
    }

    /// Stable, user-safe message. Never includes the underlying error chain.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { retry_after_secs } => format!(
                "You're sending requests a little too quickly. Please try again in {}.",
                humanize_secs(*retry_after_secs)
            ),
            Self::Unauthorized => "Please sign in to use the assistant.".to_string(),
            Self::Forbidden(_) => "You don't have permission to do that.".to_string(),
            Self::ValidationFailed(fields) => {
                format!("Some of the details need fixing: {}", join_fields(fields))
            }
            Self::NotFound(_) => "We couldn't find what you were looking for.".to_string(),
            Self::MalformedResponse(_) => {
                "The assistant produced a response we couldn't understand. Please try again."
                    .to_string()
            }
            Self::UpstreamUnavailable(_) => {
                "The assistant is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Conflict(message) => message.clone(),
            Self::Internal(_) => "An unexpected error occurred.".to_string(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::ValidationFailed(_) => 400,
            Self::NotFound(_) => 404,
            Self::MalformedResponse(_) => 502,
            Self::UpstreamUnavailable(_) => 503,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::MalformedResponse(_) => "malformed_response",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

fn humanize_secs(secs: u64) -> String {
    match secs {
        0..=59 => format!("{secs} seconds"),
        60..=3599 => {
            let minutes = secs.div_ceil(60);
            if minutes == 1 {
                "a minute".to_string()
            } else {
                format!("{minutes} minutes")
            }
        }
        _ => {
            let hours = secs.div_ceil(3600);
            if hours == 1 {
                "an hour".to_string()
            } else {
                format!("{hours} hours")
            }
        }
    }
}

impl From<LlmError> for AssistantError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MalformedResponse { reason } => Self::MalformedResponse(reason),
            LlmError::InvalidResponse { provider, reason } => {
                Self::MalformedResponse(format!("{provider}: {reason}"))
            }
            other => Self::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for AssistantError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Duplicate { .. } | StoreError::CapacityExceeded { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::InvalidQuery(reason) => Self::Internal(reason),
            StoreError::Unavailable(reason) => Self::UpstreamUnavailable(reason),
        }
    }
}

impl From<AuthError> for AssistantError {
    fn from(_: AuthError) -> Self {
        Self::Unauthorized
    }
}

impl From<crate::rate_limit::Denied> for AssistantError {
    fn from(denied: crate::rate_limit::Denied) -> Self {
        Self::RateLimited {
            retry_after_secs: denied.retry_after_secs,
        }
    }
}

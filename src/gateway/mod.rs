//! HTTP gateway.
//!
//! `GET /health` is open; every `/api` route requires a bearer token that
//! the configured [`IdentityVerifier`] maps to a caller.

mod auth;
mod handlers;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header, header::RETRY_AFTER},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::Assistant;
use crate::auth::IdentityVerifier;
use crate::error::{AssistantError, ConfigError, FieldError};

pub use auth::auth_middleware;

/// Maximum JSON body size (64 KB).
const MAX_BODY_BYTES: usize = 64 * 1024;

/// [`AssistantError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub AssistantError);

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = &self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "Request failed");
        }

        let retry_after = match err {
            AssistantError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let fields = match err {
            AssistantError::ValidationFailed(fields) => Some(fields.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            code: err.code(),
            message: err.user_message(),
            retry_after_seconds: retry_after,
            fields,
        };

        let mut response = (status, Json(serde_json::json!({ "error": body }))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Build the gateway router.
pub fn router(assistant: Arc<Assistant>, verifier: Arc<dyn IdentityVerifier>) -> Router {
    let api = Router::new()
        .route("/assistant/turn", post(handlers::run_turn))
        .route(
            "/assistant/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/assistant/agenda", post(handlers::build_agenda))
        .route("/assistant/suggest-times", post(handlers::suggest_times))
        .route_layer(middleware::from_fn_with_state(verifier, auth_middleware))
        .with_state(assistant);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the given browser origins, or `None` when the list is empty.
pub fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, ConfigError> {
    if origins.is_empty() {
        return Ok(None);
    }
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_CORS_ORIGINS".to_string(),
                value: origin.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    ))
}

/// Serve `router` until Ctrl-C.
pub async fn serve(router: Router, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down gateway");
        })
        .await
}

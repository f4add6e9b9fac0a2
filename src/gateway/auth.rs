//! Bearer token authentication middleware for the gateway.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{IdentityVerifier, bearer_token};
use crate::error::AssistantError;
use crate::gateway::ApiError;

/// Verify the `Authorization: Bearer` header and attach the caller's
/// [`Identity`](crate::auth::Identity) as a request extension.
pub async fn auth_middleware(
    State(verifier): State<Arc<dyn IdentityVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);

    let Some(token) = token else {
        return ApiError(AssistantError::Unauthorized).into_response();
    };

    match verifier.verify(&token).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError(AssistantError::from(e)).into_response()
        }
    }
}

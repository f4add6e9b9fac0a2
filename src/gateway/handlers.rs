//! Route handlers. Bodies are camelCase JSON.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;

use crate::agent::TurnReply;
use crate::assistant::{Assistant, TurnRequest};
use crate::auth::Identity;
use crate::context::ConversationMessage;
use crate::error::AssistantError;
use crate::gateway::ApiError;
use crate::tools::builtin::{Agenda, AgendaRequest, MeetingSuggestions, SuggestRequest};

type ApiResult<T> = Result<Json<T>, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError(AssistantError::invalid("body", rejection.body_text())))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn run_turn(
    State(assistant): State<Arc<Assistant>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> ApiResult<TurnReply> {
    let request = body(payload)?;
    Ok(Json(assistant.run_turn(&identity, request).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    messages: Vec<ConversationMessage>,
}

pub async fn get_history(
    State(assistant): State<Arc<Assistant>>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<HistoryResponse> {
    let messages = assistant.get_history(&identity).await?;
    Ok(Json(HistoryResponse { messages }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    removed: usize,
}

pub async fn clear_history(
    State(assistant): State<Arc<Assistant>>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<ClearResponse> {
    let removed = assistant.clear_history(&identity).await?;
    Ok(Json(ClearResponse { removed }))
}

pub async fn build_agenda(
    State(assistant): State<Arc<Assistant>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<AgendaRequest>, JsonRejection>,
) -> ApiResult<Agenda> {
    let request = body(payload)?;
    Ok(Json(assistant.build_agenda(&identity, request).await?))
}

pub async fn suggest_times(
    State(assistant): State<Arc<Assistant>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SuggestRequest>, JsonRejection>,
) -> ApiResult<MeetingSuggestions> {
    let request = body(payload)?;
    Ok(Json(assistant.suggest_times(&identity, request).await?))
}

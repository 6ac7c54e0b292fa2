//! # Handlers
//!
//! This module coordinates the flow between HTTP requests and the services.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use domains::{AppError, Contact, Message, Presence};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use services::SendMessage;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::Session;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub is_online: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
    pub is_available_to_chat: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

/// Parses a JSON body, treating an empty body as `T::default()`.
fn parse_body<T>(body: &Bytes) -> ApiResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(AppError::ValidationError(format!("invalid request body: {e}"))))
}

/// Malformed ids cannot name an existing record.
fn parse_id(raw: &str, entity: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError(AppError::not_found(entity, raw)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError(AppError::Internal(format!("encoding metrics: {e}"))))?;
    Ok((
        [(header::CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        body,
    ))
}

// ── Messages ────────────────────────────────────────────────────────────────

pub async fn list_contacts(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<Vec<Contact>>> {
    Ok(Json(state.services.contacts.resolve(&ctx).await?))
}

/// Returns the conversation with a contact and marks their messages read.
pub async fn get_conversation(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(contact_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let contact_id = parse_id(&contact_id, "User")?;
    Ok(Json(state.services.conversations.get_messages(&ctx, contact_id).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Session(ctx): Session,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let req: SendMessage = parse_body(&body)?;
    let message = state.services.conversations.send_message(&ctx, req).await?;
    state.metrics.record_message_sent();
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_message_read(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(message_id): Path<String>,
) -> ApiResult<Json<Message>> {
    let message_id = parse_id(&message_id, "Message")?;
    Ok(Json(state.services.conversations.mark_message_read(&ctx, message_id).await?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<UnreadCount>> {
    let count = state.services.conversations.unread_total(&ctx).await?;
    Ok(Json(UnreadCount { count }))
}

// ── Presence ────────────────────────────────────────────────────────────────

pub async fn presence_me(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<Presence>> {
    Ok(Json(state.services.presence.me(&ctx).await?))
}

pub async fn presence_update(
    State(state): State<AppState>,
    Session(ctx): Session,
    body: Bytes,
) -> ApiResult<Json<Presence>> {
    let update: PresenceUpdate = parse_body(&body)?;
    Ok(Json(state.services.presence.update(&ctx, update.is_online).await?))
}

pub async fn presence_availability(
    State(state): State<AppState>,
    Session(ctx): Session,
    body: Bytes,
) -> ApiResult<Json<Presence>> {
    let update: AvailabilityUpdate = parse_body(&body)?;
    Ok(Json(
        state
            .services
            .presence
            .set_availability(&ctx, update.is_available_to_chat)
            .await?,
    ))
}

pub async fn presence_heartbeat(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<Value>> {
    state.services.presence.heartbeat(&ctx).await?;
    Ok(Json(json!({ "success": true })))
}

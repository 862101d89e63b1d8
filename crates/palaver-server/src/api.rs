use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use palaver_engine::{ChatEngine, ConversationDetails, ConversationSummary};
use palaver_store::{Message, ReactionGroup, User};

use crate::error::ApiError;
use crate::webhook;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/conversations", get(list_conversations))
        .route("/conversations/direct", post(create_direct))
        .route("/conversations/group", post(create_group))
        .route("/conversations/{id}", get(conversation_details))
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/{id}/read", post(mark_read))
        .route(
            "/conversations/{id}/typing",
            get(list_typists).post(set_typing).delete(clear_typing),
        )
        .route("/conversations/{id}/unread", get(unread_count))
        .route("/unread", get(total_unread))
        .route("/messages/{id}", delete(delete_message))
        .route(
            "/messages/{id}/reactions",
            get(list_reactions).post(toggle_reaction),
        )
        .route("/messages/{id}/reactions/mine", get(my_reactions))
        .route("/users", get(list_users))
        .route("/presence", post(set_presence))
        .route("/webhooks/identity", post(webhook::identity_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Extract the identity-provider subject from `Authorization: Bearer <..>`.
///
/// Absent or malformed headers resolve to the empty subject, which the
/// engine treats as an anonymous caller: reads degrade, writes fail.
fn subject_from(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct CreateDirectRequest {
    other_user_id: Uuid,
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    name: String,
    participant_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Deserialize)]
struct ToggleReactionRequest {
    emoji: String,
}

#[derive(Deserialize)]
struct PresenceRequest {
    is_online: bool,
}

#[derive(Deserialize)]
struct UserListQuery {
    search: Option<String>,
}

#[derive(Serialize)]
struct IdResponse {
    id: Uuid,
}

#[derive(Serialize)]
struct CountResponse {
    count: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let summaries = state.engine.list_conversations(&subject_from(&headers))?;
    Ok(Json(summaries))
}

async fn conversation_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<ConversationDetails>>, ApiError> {
    let details = state
        .engine
        .conversation_details(&subject_from(&headers), id)?;
    Ok(Json(details))
}

async fn create_direct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDirectRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = state
        .engine
        .create_or_get_direct(&subject_from(&headers), req.other_user_id)?;
    Ok(Json(IdResponse { id }))
}

async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = state
        .engine
        .create_group(&subject_from(&headers), &req.name, &req.participant_ids)?;
    Ok(Json(IdResponse { id }))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.engine.list_messages(&subject_from(&headers), id)?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let message_id = state
        .engine
        .send_message(&subject_from(&headers), id, &req.content)?;
    Ok(Json(IdResponse { id: message_id }))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> StatusCode {
    state.engine.mark_read(&subject_from(&headers), id);
    StatusCode::NO_CONTENT
}

async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_message(&subject_from(&headers), id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_reaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .toggle_reaction(&subject_from(&headers), id, &req.emoji)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ReactionGroup>>, ApiError> {
    Ok(Json(state.engine.list_reactions(id)?))
}

async fn my_reactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.engine.my_reactions(&subject_from(&headers), id)?))
}

async fn set_typing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> StatusCode {
    state.engine.set_typing(&subject_from(&headers), id);
    StatusCode::NO_CONTENT
}

async fn clear_typing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> StatusCode {
    state.engine.clear_typing(&subject_from(&headers), id);
    StatusCode::NO_CONTENT
}

async fn list_typists(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<User>>, ApiError> {
    let typists = state
        .engine
        .list_active_typists(&subject_from(&headers), id)?;
    Ok(Json(typists))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.engine.unread_count(&subject_from(&headers), id)?;
    Ok(Json(CountResponse { count }))
}

async fn total_unread(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.engine.total_unread(&subject_from(&headers))?;
    Ok(Json(CountResponse { count }))
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let subject = subject_from(&headers);
    let users = match query.search.as_deref() {
        Some(term) if !term.is_empty() => state.engine.search_users(&subject, term)?,
        _ => state.engine.list_users(&subject)?,
    };
    Ok(Json(users))
}

async fn set_presence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PresenceRequest>,
) -> StatusCode {
    state.engine.set_online(&subject_from(&headers), req.is_online);
    StatusCode::NO_CONTENT
}

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::chat::{ChatMessageView, ChatRequest, GameEventView, StatsResponse},
    error::AppError,
    services::chat_service,
    state::SharedState,
};

/// Chat, history and leaderboard endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies/{code}/chat", get(list_messages).post(post_message))
        .route("/lobbies/{code}/events", get(list_events))
        .route("/lobbies/{code}/stats", get(stats))
}

/// Latest chat messages, oldest first.
#[utoipa::path(
    get,
    path = "/lobbies/{code}/chat",
    tag = "chat",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 200, description = "Chat messages", body = [ChatMessageView]),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<ChatMessageView>>, AppError> {
    Ok(Json(chat_service::list_messages(&state, &code).await?))
}

/// Post a chat message to everyone in the lobby.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/chat",
    tag = "chat",
    params(("code" = String, Path, description = "Six-character join code")),
    request_body = ChatRequest,
    responses(
        (status = 201, description = "Message posted", body = ChatMessageView),
        (status = 400, description = "Empty or oversized message"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn post_message(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<ChatRequest>>,
) -> Result<(StatusCode, Json<ChatMessageView>), AppError> {
    let message =
        chat_service::post_message(&state, &code, payload.player_id, payload.message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Game history, newest first.
#[utoipa::path(
    get,
    path = "/lobbies/{code}/events",
    tag = "chat",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 200, description = "Game events", body = [GameEventView]),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<GameEventView>>, AppError> {
    Ok(Json(chat_service::list_events(&state, &code).await?))
}

/// Per-player tallies and category leaders.
#[utoipa::path(
    get,
    path = "/lobbies/{code}/stats",
    tag = "chat",
    params(("code" = String, Path, description = "Six-character join code")),
    responses((status = 200, description = "Lobby statistics", body = StatsResponse))
)]
pub async fn stats(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<StatsResponse>, AppError> {
    Ok(Json(chat_service::stats(&state, &code).await?))
}

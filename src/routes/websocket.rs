use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    error::AppError,
    services::{lobby_service, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/lobbies/{code}/ws",
    tag = "websocket",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "No lobby uses that code")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session.
///
/// The first frame must identify a seated player within ten seconds.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let handle = lobby_service::resolve(&state, &code).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, handle, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/lobbies/{code}/ws", get(ws_handler))
}

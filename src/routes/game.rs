use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::{command::CommandRequest, lobby::LobbySnapshot},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes carrying player moves.
pub fn router() -> Router<SharedState> {
    Router::new().route("/lobbies/{code}/commands", post(submit_command))
}

/// Apply one game command on behalf of a seated player.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/commands",
    tag = "game",
    params(("code" = String, Path, description = "Six-character join code")),
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Command applied", body = LobbySnapshot),
        (status = 400, description = "Malformed command"),
        (status = 401, description = "Command reserved to the host"),
        (status = 404, description = "Unknown lobby or player"),
        (status = 409, description = "Not allowed right now, or the lobby moved past `expected_version`")
    )
)]
pub async fn submit_command(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<CommandRequest>>,
) -> Result<Json<LobbySnapshot>, AppError> {
    let snapshot = game_service::apply_command(
        &state,
        &code,
        payload.player_id,
        payload.expected_version,
        payload.command,
    )
    .await?;
    Ok(Json(snapshot))
}

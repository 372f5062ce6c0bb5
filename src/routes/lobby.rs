use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::lobby::{
        HostActionRequest, JoinResponse, LobbySnapshot, PlayerSessionResponse, UpdatePlayerRequest,
    },
    error::AppError,
    services::lobby_service,
    state::{SharedState, lobby::PlayerId},
};

/// Lobby lifecycle endpoints: create, join, leave, start and reset.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies", post(create_lobby))
        .route("/lobbies/{code}", get(get_lobby))
        .route("/lobbies/{code}/players", post(join_lobby))
        .route(
            "/lobbies/{code}/players/{player_id}",
            get(verify_player).patch(update_player).delete(leave_lobby),
        )
        .route("/lobbies/{code}/start", post(start_game))
        .route("/lobbies/{code}/reset", post(reset_game))
}

/// Open a new lobby; the caller becomes its host.
#[utoipa::path(
    post,
    path = "/lobbies",
    tag = "lobbies",
    responses(
        (status = 201, description = "Lobby created", body = JoinResponse),
        (status = 409, description = "No free join code could be generated")
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let created = lobby_service::create_lobby(&state).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Current snapshot of a lobby, for clients that poll.
#[utoipa::path(
    get,
    path = "/lobbies/{code}",
    tag = "lobbies",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 200, description = "Lobby snapshot", body = LobbySnapshot),
        (status = 404, description = "No lobby uses that code")
    )
)]
pub async fn get_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<LobbySnapshot>, AppError> {
    Ok(Json(lobby_service::get_lobby(&state, &code).await?))
}

/// Take a seat in a lobby that is still waiting for players.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/players",
    tag = "lobbies",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 201, description = "Seat taken", body = JoinResponse),
        (status = 409, description = "Lobby is full or already playing"),
        (status = 404, description = "No lobby uses that code")
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let joined = lobby_service::join_lobby(&state, &code).await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

/// Check that a remembered player id still has a seat.
#[utoipa::path(
    get,
    path = "/lobbies/{code}/players/{player_id}",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Six-character join code"),
        ("player_id" = String, Path, description = "Player identifier returned on join")
    ),
    responses(
        (status = 200, description = "Player and lobby", body = PlayerSessionResponse),
        (status = 404, description = "Unknown lobby or player")
    )
)]
pub async fn verify_player(
    State(state): State<SharedState>,
    Path((code, player_id)): Path<(String, PlayerId)>,
) -> Result<Json<PlayerSessionResponse>, AppError> {
    Ok(Json(
        lobby_service::verify_player(&state, &code, player_id).await?,
    ))
}

/// Rename a player or set their gender.
#[utoipa::path(
    patch,
    path = "/lobbies/{code}/players/{player_id}",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Six-character join code"),
        ("player_id" = String, Path, description = "Player identifier returned on join")
    ),
    request_body = UpdatePlayerRequest,
    responses(
        (status = 200, description = "Player updated", body = LobbySnapshot),
        (status = 400, description = "Invalid name")
    )
)]
pub async fn update_player(
    State(state): State<SharedState>,
    Path((code, player_id)): Path<(String, PlayerId)>,
    Valid(Json(payload)): Valid<Json<UpdatePlayerRequest>>,
) -> Result<Json<LobbySnapshot>, AppError> {
    let snapshot =
        lobby_service::update_player(&state, &code, player_id, payload.name, payload.gender)
            .await?;
    Ok(Json(snapshot))
}

/// Give up a seat; the last player out closes the lobby.
#[utoipa::path(
    delete,
    path = "/lobbies/{code}/players/{player_id}",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Six-character join code"),
        ("player_id" = String, Path, description = "Player identifier returned on join")
    ),
    responses(
        (status = 204, description = "Player left"),
        (status = 404, description = "Unknown lobby or player")
    )
)]
pub async fn leave_lobby(
    State(state): State<SharedState>,
    Path((code, player_id)): Path<(String, PlayerId)>,
) -> Result<StatusCode, AppError> {
    lobby_service::leave_lobby(&state, &code, player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host-only: deal the first turn.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/start",
    tag = "lobbies",
    params(("code" = String, Path, description = "Six-character join code")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Game started", body = LobbySnapshot),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Lobby changed since `expected_version`")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<HostActionRequest>>,
) -> Result<Json<LobbySnapshot>, AppError> {
    let snapshot =
        lobby_service::start_game(&state, &code, payload.player_id, payload.expected_version)
            .await?;
    Ok(Json(snapshot))
}

/// Host-only: reshuffle and clear every counter.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/reset",
    tag = "lobbies",
    params(("code" = String, Path, description = "Six-character join code")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Game reset", body = LobbySnapshot),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Lobby changed since `expected_version`")
    )
)]
pub async fn reset_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<HostActionRequest>>,
) -> Result<Json<LobbySnapshot>, AppError> {
    let snapshot =
        lobby_service::reset_game(&state, &code, payload.player_id, payload.expected_version)
            .await?;
    Ok(Json(snapshot))
}

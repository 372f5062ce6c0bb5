use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/lobbies/{code}/sse",
    tag = "sse",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "No lobby uses that code")
    )
)]
/// Stream a lobby's snapshots, game events and chat to a client.
pub async fn lobby_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe_lobby(&state, &code).await?;
    info!(lobby = %subscription.code, "new lobby SSE connection");
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/lobbies/{code}/sse", get(lobby_stream))
}

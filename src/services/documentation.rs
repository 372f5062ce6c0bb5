use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Sunny Deck backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::create_lobby,
        crate::routes::lobby::get_lobby,
        crate::routes::lobby::join_lobby,
        crate::routes::lobby::verify_player,
        crate::routes::lobby::update_player,
        crate::routes::lobby::leave_lobby,
        crate::routes::lobby::start_game,
        crate::routes::lobby::reset_game,
        crate::routes::game::submit_command,
        crate::routes::chat::list_messages,
        crate::routes::chat::post_message,
        crate::routes::chat::list_events,
        crate::routes::chat::stats,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::ws::PlayerInboundMessage,
            crate::dto::ws::PlayerOutboundMessage,
        )
    ),
    tags(
        (name = "lobbies", description = "Lobby lifecycle and seats"),
        (name = "game", description = "Player moves"),
        (name = "chat", description = "Chat, history and statistics"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "websocket", description = "Bidirectional player sockets"),
        (name = "health", description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/lobbies",
            "/lobbies/{code}",
            "/lobbies/{code}/players",
            "/lobbies/{code}/players/{player_id}",
            "/lobbies/{code}/start",
            "/lobbies/{code}/reset",
            "/lobbies/{code}/commands",
            "/lobbies/{code}/chat",
            "/lobbies/{code}/events",
            "/lobbies/{code}/stats",
            "/lobbies/{code}/sse",
            "/lobbies/{code}/ws",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

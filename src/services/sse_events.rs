use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dao::models::{ChatMessageEntity, GameEventEntity},
    dto::{
        chat::{ChatMessageView, GameEventView},
        lobby::LobbySnapshot,
        sse::{Handshake, ServerEvent, SystemStatus},
    },
    state::{SharedState, SseHub, lobby::Lobby},
};

pub const EVENT_HANDSHAKE: &str = "handshake";
pub const EVENT_LOBBY_SNAPSHOT: &str = "lobby.snapshot";
pub const EVENT_GAME_EVENT: &str = "game.event";
pub const EVENT_CHAT_MESSAGE: &str = "chat.message";
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast the latest state of a lobby to its subscribers.
pub fn broadcast_snapshot(hub: &SseHub, lobby: &Lobby) {
    send_lobby_event(hub, EVENT_LOBBY_SNAPSHOT, &LobbySnapshot::from(lobby));
}

/// Broadcast a single game-history entry.
pub fn broadcast_game_event(hub: &SseHub, event: &GameEventEntity) {
    send_lobby_event(hub, EVENT_GAME_EVENT, &GameEventView::from(event));
}

/// Broadcast a freshly posted chat message.
pub fn broadcast_chat_message(hub: &SseHub, message: &ChatMessageEntity) {
    send_lobby_event(hub, EVENT_CHAT_MESSAGE, &ChatMessageView::from(message));
}

/// Events a new SSE subscriber gets before the shared stream: handshake, then snapshot.
pub fn greeting(state: &SharedState, lobby: &Lobby) -> Vec<ServerEvent> {
    let handshake = Handshake {
        lobby: lobby.code.clone(),
        message: "lobby stream connected".into(),
        degraded: state.is_degraded(),
    };

    [
        ServerEvent::json(Some(EVENT_HANDSHAKE.to_owned()), &handshake),
        ServerEvent::json(
            Some(EVENT_LOBBY_SNAPSHOT.to_owned()),
            &LobbySnapshot::from(lobby),
        ),
    ]
    .into_iter()
    .filter_map(|event| match event {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialize SSE greeting");
            None
        }
    })
    .collect()
}

/// Relay degraded-mode changes to every live lobby.
pub async fn run_status_broadcaster(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        debug!(degraded, lobbies = state.lobbies().len(), "relaying storage status");
        for entry in state.lobbies().iter() {
            send_lobby_event(entry.value().hub(), EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
        }
    }
}

fn send_lobby_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize lobby SSE payload"),
    }
}

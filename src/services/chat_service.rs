use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::ChatMessageEntity,
    dto::chat::{ChatMessageView, GameEventView, PlayerStatsView, StatsResponse, TopPlayer},
    error::ServiceError,
    services::{lobby_service, sse_events},
    state::{
        SharedState,
        lobby::{Lobby, PlayerId, PlayerStats},
    },
};

/// Messages and history entries returned per request.
const HISTORY_LIMIT: usize = 100;

/// Store a chat message and push it to the lobby's subscribers.
pub async fn post_message(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
    message: String,
) -> Result<ChatMessageView, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let (lobby_id, player_name) = {
        let lobby = handle.lobby().lock().await;
        let player = lobby.player(player_id).ok_or_else(|| {
            ServiceError::NotFound(format!("player `{player_id}` is not part of this lobby"))
        })?;
        (lobby.id, player.name.clone())
    };

    let store = state.require_lobby_store().await?;
    let entity = ChatMessageEntity {
        id: Uuid::new_v4(),
        lobby_id,
        player_id,
        player_name,
        message: message.trim().to_owned(),
        created_at: SystemTime::now(),
    };
    store.append_chat(entity.clone()).await?;

    info!(lobby = %handle.code(), player = %player_id, "chat message posted");
    sse_events::broadcast_chat_message(handle.hub(), &entity);
    Ok(ChatMessageView::from(&entity))
}

/// The latest chat messages, oldest first.
pub async fn list_messages(
    state: &SharedState,
    code: &str,
) -> Result<Vec<ChatMessageView>, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let store = state.require_lobby_store().await?;
    let rows = store.list_chat(handle.id(), HISTORY_LIMIT).await?;
    Ok(rows.iter().map(ChatMessageView::from).collect())
}

/// The latest game-history entries, newest first.
pub async fn list_events(
    state: &SharedState,
    code: &str,
) -> Result<Vec<GameEventView>, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let store = state.require_lobby_store().await?;
    let rows = store.list_events(handle.id(), HISTORY_LIMIT).await?;
    Ok(rows.iter().map(GameEventView::from).collect())
}

/// Per-player tallies and the leader of each category.
pub async fn stats(state: &SharedState, code: &str) -> Result<StatsResponse, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let lobby = handle.lobby().lock().await;
    Ok(build_stats(&lobby))
}

fn build_stats(lobby: &Lobby) -> StatsResponse {
    let players: Vec<PlayerStatsView> = lobby
        .players
        .iter()
        .map(|player| PlayerStatsView {
            player_id: player.id,
            name: player.name.clone(),
            stats: lobby.stats.get(&player.id).copied().unwrap_or_default(),
        })
        .collect();

    let categories: [(&'static str, fn(&PlayerStats) -> u32); 3] = [
        ("most_drinks", |stats: &PlayerStats| stats.drinks),
        ("most_face_cards", |stats: &PlayerStats| stats.face_cards),
        ("most_actions", |stats: &PlayerStats| stats.actions_used),
    ];

    let mut top_players = IndexMap::new();
    for (category, tally) in categories {
        top_players.insert(category, leader(&players, tally));
    }

    StatsResponse {
        players,
        top_players,
    }
}

/// Highest non-zero tally; ties go to the earliest seat.
fn leader(players: &[PlayerStatsView], tally: fn(&PlayerStats) -> u32) -> Option<TopPlayer> {
    let mut best: Option<&PlayerStatsView> = None;
    for player in players {
        let value = tally(&player.stats);
        if value > 0 && best.is_none_or(|current| value > tally(&current.stats)) {
            best = Some(player);
        }
    }
    best.map(|player| TopPlayer {
        player_id: player.player_id,
        name: player.name.clone(),
        value: tally(&player.stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{state_machine::GameEventKind, testing::memory_state};

    #[tokio::test]
    async fn chat_round_trips_through_the_store() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        let handle = lobby_service::resolve(&state, &code).await.unwrap();
        let mut receiver = handle.hub().subscribe();

        let posted = post_message(&state, &code, created.player_id, "  Wildcard!  ".into())
            .await
            .unwrap();
        assert_eq!(posted.message, "Wildcard!");
        assert_eq!(posted.player_name, "Host");

        let pushed = receiver.recv().await.unwrap();
        assert_eq!(pushed.event.as_deref(), Some(sse_events::EVENT_CHAT_MESSAGE));

        let listed = list_messages(&state, &code).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, posted.id);
    }

    #[tokio::test]
    async fn chat_needs_a_store() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();
        state.update_degraded(true);

        let err = post_message(&state, &created.lobby.code, created.player_id, "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn strangers_cannot_chat() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();

        let err = post_message(&state, &created.lobby.code, PlayerId::new(), "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        lobby_service::start_game(&state, &code, created.player_id, None)
            .await
            .unwrap();

        let events = list_events(&state, &code).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|event| event.event_type).collect();
        assert_eq!(kinds, vec![GameEventKind::GameStarted, GameEventKind::PlayerJoined]);
    }

    #[tokio::test]
    async fn stats_report_leaders_per_category() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        let guest = lobby_service::join_lobby(&state, &code).await.unwrap();
        {
            let handle = lobby_service::resolve(&state, &code).await.unwrap();
            let mut lobby = handle.lobby().lock().await;
            lobby.stats.insert(
                guest.player_id,
                PlayerStats {
                    drinks: 4,
                    face_cards: 1,
                    ..PlayerStats::default()
                },
            );
            lobby.stats.insert(
                created.player_id,
                PlayerStats {
                    face_cards: 1,
                    ..PlayerStats::default()
                },
            );
        }

        let board = stats(&state, &code).await.unwrap();
        assert_eq!(board.players.len(), 2);
        let drinks = board.top_players["most_drinks"].as_ref().unwrap();
        assert_eq!(drinks.player_id, guest.player_id);
        assert_eq!(drinks.value, 4);
        let faces = board.top_players["most_face_cards"].as_ref().unwrap();
        assert_eq!(faces.player_id, created.player_id);
        assert!(board.top_players["most_actions"].is_none());
    }
}

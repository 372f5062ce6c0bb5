use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ChatMessageEntity, GameEventEntity},
    dto::{format_system_time, validation::validate_chat_message},
    state::{
        lobby::{PlayerId, PlayerStats},
        state_machine::{EventDetails, GameEventKind},
    },
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Payload used to post a chat message.
pub struct ChatRequest {
    pub player_id: PlayerId,
    #[validate(custom(function = "validate_chat_message"))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Chat message as returned to clients and pushed on the `chat.message` event.
pub struct ChatMessageView {
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    pub created_at: String,
}

impl From<&ChatMessageEntity> for ChatMessageView {
    fn from(entity: &ChatMessageEntity) -> Self {
        Self {
            id: entity.id,
            lobby_id: entity.lobby_id,
            player_id: entity.player_id,
            player_name: entity.player_name.clone(),
            message: entity.message.clone(),
            created_at: format_system_time(entity.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Game-history entry, also pushed live on the `game.event` event.
pub struct GameEventView {
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub event_type: GameEventKind,
    pub player_id: Option<PlayerId>,
    pub player_name: String,
    pub details: EventDetails,
    pub created_at: String,
}

impl From<&GameEventEntity> for GameEventView {
    fn from(entity: &GameEventEntity) -> Self {
        Self {
            id: entity.id,
            lobby_id: entity.lobby_id,
            event_type: entity.event_type,
            player_id: entity.player_id,
            player_name: entity.player_name.clone(),
            details: entity.details.clone(),
            created_at: format_system_time(entity.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Tallies of one player.
pub struct PlayerStatsView {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(flatten)]
    pub stats: PlayerStats,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Leader of one stats category.
pub struct TopPlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Stats board for a lobby.
pub struct StatsResponse {
    pub players: Vec<PlayerStatsView>,
    /// Leaders keyed by category (`most_drinks`, `most_face_cards`, `most_actions`).
    /// A category is `null` while every tally is zero.
    #[schema(value_type = Object)]
    pub top_players: IndexMap<&'static str, Option<TopPlayer>>,
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_player_name},
    state::{
        cards::Card,
        lobby::{
            DaymanNightman, Gender, Lobby, LobbyStatus, Mate, Player, PlayerId, Role,
            RoleCounters,
        },
        minigames::{RpsGame, Vote, WordGame},
        prompt::ActivePrompt,
    },
};

/// One table slot as shown to clients. Face-down cards hide their code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CardView {
    pub position: usize,
    pub drawn: bool,
    /// Card code, only once the card has been drawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawn_by: Option<PlayerId>,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        Self {
            position: card.position,
            drawn: card.drawn,
            code: card.drawn.then(|| card.code.to_string()),
            drawn_by: card.drawn_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Public view of a participant.
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub role: Option<Role>,
    pub gender: Option<Gender>,
    /// RFC 3339 join timestamp.
    pub joined_at: String,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            is_host: player.is_host,
            role: player.role,
            gender: player.gender,
            joined_at: format_system_time(player.joined_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Everything a client needs to render the table.
pub struct LobbySnapshot {
    pub id: Uuid,
    pub code: String,
    pub status: LobbyStatus,
    /// Mutation counter; send it back as `expected_version` to guard a command.
    pub version: u64,
    pub cards_remaining: usize,
    pub deck: Vec<CardView>,
    /// Players in join order, which is also turn order.
    pub players: Vec<PlayerView>,
    pub current_player_id: Option<PlayerId>,
    pub turn_number: u32,
    pub active_prompt: Option<ActivePrompt>,
    pub word_game: Option<WordGame>,
    pub rps_game: Option<RpsGame>,
    pub vote: Option<Vote>,
    pub mate: Option<Mate>,
    pub dayman_nightman: Option<DaymanNightman>,
    pub snail_player: Option<PlayerId>,
    pub counters: RoleCounters,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Lobby> for LobbySnapshot {
    fn from(lobby: &Lobby) -> Self {
        Self {
            id: lobby.id,
            code: lobby.code.clone(),
            status: lobby.status,
            version: lobby.version,
            cards_remaining: lobby.deck.iter().filter(|card| !card.drawn).count(),
            deck: lobby.deck.iter().map(CardView::from).collect(),
            players: lobby.players.iter().map(PlayerView::from).collect(),
            current_player_id: lobby.current_player_id,
            turn_number: lobby.turn_number,
            active_prompt: lobby.active_prompt.clone(),
            word_game: lobby.word_game.clone(),
            rps_game: lobby.rps_game.clone(),
            vote: lobby.vote.clone(),
            mate: lobby.mate,
            dayman_nightman: lobby.dayman_nightman,
            snail_player: lobby.snail_player,
            counters: lobby.counters.clone(),
            created_at: format_system_time(lobby.created_at),
            updated_at: format_system_time(lobby.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Returned when a lobby is created or joined; keep `player_id` to reconnect.
pub struct JoinResponse {
    pub player_id: PlayerId,
    pub lobby: LobbySnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
/// Returned when a stored player id is verified.
pub struct PlayerSessionResponse {
    pub player: PlayerView,
    pub lobby: LobbySnapshot,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Payload used to rename a player or change their gender.
pub struct UpdatePlayerRequest {
    #[validate(custom(function = "validate_player_name"))]
    #[serde(default)]
    pub name: Option<String>,
    /// `null` clears the gender, omitting the field leaves it untouched.
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Gender>)]
    pub gender: Option<Option<Gender>>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Payload for host-only lobby actions (start, reset).
pub struct HostActionRequest {
    pub player_id: PlayerId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use rand::{SeedableRng, rngs::StdRng};
    use validator::Validate;

    use super::*;
    use crate::{config::GameRules, state::state_machine::CommandContext};

    #[test]
    fn snapshot_hides_face_down_cards() {
        let rules = GameRules::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        let mut lobby = Lobby::open("ABC123".into(), PlayerId::new(), &mut ctx);
        lobby.deck[4].drawn = true;

        let snapshot = LobbySnapshot::from(&lobby);
        assert_eq!(snapshot.cards_remaining, 51);
        assert_eq!(snapshot.deck[4].code, Some(lobby.deck[4].code.to_string()));
        assert!(snapshot.deck.iter().filter(|card| !card.drawn).all(|card| card.code.is_none()));
        assert_eq!(snapshot.players[0].name, "Host");
    }

    #[test]
    fn update_request_tells_null_gender_from_missing() {
        let cleared: UpdatePlayerRequest = serde_json::from_str(r#"{"gender": null}"#).unwrap();
        assert_eq!(cleared.gender, Some(None));

        let untouched: UpdatePlayerRequest = serde_json::from_str(r#"{"name": "Dee"}"#).unwrap();
        assert_eq!(untouched.gender, None);
        assert!(untouched.validate().is_ok());

        let blank: UpdatePlayerRequest = serde_json::from_str(r#"{"name": "  "}"#).unwrap();
        assert!(blank.validate().is_err());
    }
}

use std::{collections::BTreeMap, time::SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::storage::StorageError,
    state::{
        cards::Card,
        lobby::{
            DaymanNightman, Gender, Lobby, LobbyStatus, Mate, Player, PlayerId, PlayerStats,
            Role, RoleCounters,
        },
        minigames::{RpsGame, Vote, WordGame},
        prompt::ActivePrompt,
        state_machine::{EventDetails, GameEventKind, GameLogEntry},
    },
};

/// Row of the `lobbies` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LobbyEntity {
    /// Stable identifier for the lobby.
    pub id: Uuid,
    /// Six-character join code.
    pub code: String,
    pub status: LobbyStatus,
    /// Everything on the table besides the players.
    pub table: TableEntity,
    /// Mutation counter, used for optimistic concurrency.
    pub version: u64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Deck, turn pointer and everything currently blocking the table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableEntity {
    pub deck: Vec<Card>,
    pub current_player_id: Option<PlayerId>,
    pub turn_number: u32,
    pub active_prompt: Option<ActivePrompt>,
    pub word_game: Option<WordGame>,
    pub rps_game: Option<RpsGame>,
    pub vote: Option<Vote>,
    pub mate: Option<Mate>,
    pub dayman_nightman: Option<DaymanNightman>,
    pub snail_player: Option<PlayerId>,
    #[serde(default)]
    pub stats: BTreeMap<PlayerId, PlayerStats>,
    #[serde(default)]
    pub counters: RoleCounters,
}

/// Row of the `players` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    pub id: PlayerId,
    pub lobby_id: Uuid,
    /// Position in join order; turn order follows it.
    pub seat: usize,
    pub name: String,
    pub is_host: bool,
    pub role: Option<Role>,
    pub gender: Option<Gender>,
    pub joined_at: SystemTime,
}

/// A lobby row together with its player rows, written and read as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLobby {
    pub lobby: LobbyEntity,
    pub players: Vec<PlayerEntity>,
}

/// Row of the `chat_messages` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    pub created_at: SystemTime,
}

/// Row of the `game_events` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEventEntity {
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub event_type: GameEventKind,
    pub player_id: Option<PlayerId>,
    pub player_name: String,
    pub details: EventDetails,
    pub created_at: SystemTime,
}

impl GameEventEntity {
    /// Stamp a history entry for `lobby_id`.
    pub fn from_log(lobby_id: Uuid, entry: GameLogEntry, created_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            lobby_id,
            event_type: entry.kind,
            player_id: entry.player_id,
            player_name: entry.player_name,
            details: entry.details,
            created_at,
        }
    }
}

impl From<&Lobby> for StoredLobby {
    fn from(lobby: &Lobby) -> Self {
        let players = lobby
            .players
            .iter()
            .enumerate()
            .map(|(seat, player)| PlayerEntity {
                id: player.id,
                lobby_id: lobby.id,
                seat,
                name: player.name.clone(),
                is_host: player.is_host,
                role: player.role,
                gender: player.gender,
                joined_at: player.joined_at,
            })
            .collect();

        Self {
            lobby: LobbyEntity {
                id: lobby.id,
                code: lobby.code.clone(),
                status: lobby.status,
                table: TableEntity {
                    deck: lobby.deck.clone(),
                    current_player_id: lobby.current_player_id,
                    turn_number: lobby.turn_number,
                    active_prompt: lobby.active_prompt.clone(),
                    word_game: lobby.word_game.clone(),
                    rps_game: lobby.rps_game.clone(),
                    vote: lobby.vote.clone(),
                    mate: lobby.mate,
                    dayman_nightman: lobby.dayman_nightman,
                    snail_player: lobby.snail_player,
                    stats: lobby.stats.clone(),
                    counters: lobby.counters.clone(),
                },
                version: lobby.version,
                created_at: lobby.created_at,
                updated_at: lobby.updated_at,
            },
            players,
        }
    }
}

impl TryFrom<StoredLobby> for Lobby {
    type Error = StorageError;

    fn try_from(stored: StoredLobby) -> Result<Self, Self::Error> {
        let StoredLobby { lobby, mut players } = stored;

        if let Some(stray) = players.iter().find(|player| player.lobby_id != lobby.id) {
            return Err(StorageError::Corrupted {
                id: stray.id.to_string(),
                reason: format!("player row points at lobby `{}`", stray.lobby_id),
            });
        }
        players.sort_by_key(|player| player.seat);

        let table = lobby.table;
        Ok(Lobby {
            id: lobby.id,
            code: lobby.code,
            status: lobby.status,
            deck: table.deck,
            players: players
                .into_iter()
                .map(|player| Player {
                    id: player.id,
                    name: player.name,
                    is_host: player.is_host,
                    role: player.role,
                    gender: player.gender,
                    joined_at: player.joined_at,
                })
                .collect(),
            current_player_id: table.current_player_id,
            turn_number: table.turn_number,
            active_prompt: table.active_prompt,
            word_game: table.word_game,
            rps_game: table.rps_game,
            vote: table.vote,
            mate: table.mate,
            dayman_nightman: table.dayman_nightman,
            snail_player: table.snail_player,
            stats: table.stats,
            counters: table.counters,
            version: lobby.version,
            created_at: lobby.created_at,
            updated_at: lobby.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{config::GameRules, state::state_machine::CommandContext};

    fn sample_lobby() -> Lobby {
        let rules = GameRules::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        let mut lobby = Lobby::open("QWE123".into(), PlayerId::new(), &mut ctx);
        lobby.join(PlayerId::new(), &mut ctx).unwrap();
        lobby.join(PlayerId::new(), &mut ctx).unwrap();
        lobby
    }

    #[test]
    fn players_come_back_in_seat_order() {
        let lobby = sample_lobby();
        let mut stored = StoredLobby::from(&lobby);
        assert_eq!(stored.players.len(), 3);
        assert_eq!(stored.players[2].seat, 2);

        stored.players.reverse();
        let restored = Lobby::try_from(stored).unwrap();
        assert_eq!(restored, lobby);
    }

    #[test]
    fn foreign_player_rows_are_rejected() {
        let lobby = sample_lobby();
        let mut stored = StoredLobby::from(&lobby);
        stored.players[1].lobby_id = Uuid::new_v4();

        assert!(matches!(
            Lobby::try_from(stored),
            Err(StorageError::Corrupted { .. })
        ));
    }
}

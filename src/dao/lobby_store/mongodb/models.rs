use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{ChatMessageEntity, GameEventEntity, LobbyEntity, PlayerEntity, TableEntity},
    state::{
        lobby::{Gender, LobbyStatus, PlayerId, Role},
        state_machine::{EventDetails, GameEventKind},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLobbyDocument {
    #[serde(rename = "_id")]
    id: String,
    code: String,
    status: LobbyStatus,
    table: TableEntity,
    version: u64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<LobbyEntity> for MongoLobbyDocument {
    fn from(value: LobbyEntity) -> Self {
        Self {
            id: value.id.to_string(),
            code: value.code,
            status: value.status,
            table: value.table,
            version: value.version,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoLobbyDocument> for LobbyEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoLobbyDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            code: value.code,
            status: value.status,
            table: value.table,
            version: value.version,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: PlayerId,
    lobby_id: String,
    seat: u32,
    name: String,
    is_host: bool,
    role: Option<Role>,
    gender: Option<Gender>,
    joined_at: DateTime,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            lobby_id: value.lobby_id.to_string(),
            seat: value.seat as u32,
            name: value.name,
            is_host: value.is_host,
            role: value.role,
            gender: value.gender,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> MongoResult<Self> {
        Ok(Self {
            id: value.id,
            lobby_id: parse_id(&value.lobby_id)?,
            seat: value.seat as usize,
            name: value.name,
            is_host: value.is_host,
            role: value.role,
            gender: value.gender,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChatDocument {
    #[serde(rename = "_id")]
    id: String,
    lobby_id: String,
    player_id: PlayerId,
    player_name: String,
    message: String,
    created_at: DateTime,
}

impl From<ChatMessageEntity> for MongoChatDocument {
    fn from(value: ChatMessageEntity) -> Self {
        Self {
            id: value.id.to_string(),
            lobby_id: value.lobby_id.to_string(),
            player_id: value.player_id,
            player_name: value.player_name,
            message: value.message,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoChatDocument> for ChatMessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoChatDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            lobby_id: parse_id(&value.lobby_id)?,
            player_id: value.player_id,
            player_name: value.player_name,
            message: value.message,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: String,
    lobby_id: String,
    event_type: GameEventKind,
    player_id: Option<PlayerId>,
    player_name: String,
    details: EventDetails,
    created_at: DateTime,
    /// Order of the entry within the mutation that produced it.
    sequence: u32,
}

impl MongoEventDocument {
    pub fn new(value: GameEventEntity, sequence: u32) -> Self {
        Self {
            id: value.id.to_string(),
            lobby_id: value.lobby_id.to_string(),
            event_type: value.event_type,
            player_id: value.player_id,
            player_name: value.player_name,
            details: value.details,
            created_at: DateTime::from_system_time(value.created_at),
            sequence,
        }
    }
}

impl TryFrom<MongoEventDocument> for GameEventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEventDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            lobby_id: parse_id(&value.lobby_id)?,
            event_type: value.event_type,
            player_id: value.player_id,
            player_name: value.player_name,
            details: value.details,
            created_at: value.created_at.to_system_time(),
        })
    }
}

fn parse_id(id: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(id).map_err(|source| MongoDaoError::InvalidId {
        id: id.to_owned(),
        source,
    })
}

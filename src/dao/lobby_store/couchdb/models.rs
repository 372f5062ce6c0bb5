use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dao::models::{ChatMessageEntity, GameEventEntity, LobbyEntity, PlayerEntity},
    state::lobby::PlayerId,
};

pub const LOBBY_PREFIX: &str = "lobby::";
pub const CODE_PREFIX: &str = "lobby-code::";
pub const PLAYER_PREFIX: &str = "player::";
pub const CHAT_PREFIX: &str = "chat::";
pub const EVENT_PREFIX: &str = "event::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    pub value: RowValue,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RowValue {
    pub rev: String,
}

/// Per-document result of a `_bulk_docs` call.
#[derive(Debug, Deserialize)]
pub struct BulkResult {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchLobbyDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub lobby: LobbyEntity,
}

impl From<(LobbyEntity, Option<String>)> for CouchLobbyDocument {
    fn from((lobby, rev): (LobbyEntity, Option<String>)) -> Self {
        Self {
            id: lobby_doc_id(lobby.id),
            rev,
            lobby,
        }
    }
}

/// Points a join code at the lobby document that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCodeDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub lobby_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub player: PlayerEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchChatDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub message: ChatMessageEntity,
}

impl From<ChatMessageEntity> for CouchChatDocument {
    fn from(message: ChatMessageEntity) -> Self {
        Self {
            id: format!(
                "{}{}::{:016}::{}",
                CHAT_PREFIX,
                message.lobby_id,
                millis(message.created_at),
                message.id
            ),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub event: GameEventEntity,
}

impl CouchEventDocument {
    /// `sequence` keeps entries produced by one mutation in order under one timestamp.
    pub fn new(event: GameEventEntity, sequence: usize) -> Self {
        Self {
            id: format!(
                "{}{}::{:016}::{:04}::{}",
                EVENT_PREFIX,
                event.lobby_id,
                millis(event.created_at),
                sequence,
                event.id
            ),
            event,
        }
    }
}

/// Marks a document as deleted inside a `_bulk_docs` request.
#[derive(Debug, Serialize)]
pub struct Tombstone {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

impl Tombstone {
    pub fn new(id: String, rev: String) -> Self {
        Self {
            id,
            rev,
            deleted: true,
        }
    }
}

pub fn lobby_doc_id(id: Uuid) -> String {
    format!("{LOBBY_PREFIX}{id}")
}

pub fn code_doc_id(code: &str) -> String {
    format!("{CODE_PREFIX}{code}")
}

pub fn player_prefix(lobby_id: Uuid) -> String {
    format!("{PLAYER_PREFIX}{lobby_id}::")
}

pub fn player_doc_id(lobby_id: Uuid, player_id: PlayerId) -> String {
    format!("{}{player_id}", player_prefix(lobby_id))
}

pub fn chat_prefix(lobby_id: Uuid) -> String {
    format!("{CHAT_PREFIX}{lobby_id}::")
}

pub fn event_prefix(lobby_id: Uuid) -> String {
    format!("{EVENT_PREFIX}{lobby_id}::")
}

fn millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::state_machine::{GameEventKind, GameLogEntry};

    #[test]
    fn log_ids_sort_chronologically() {
        let lobby_id = Uuid::new_v4();
        let at = |secs| UNIX_EPOCH + Duration::from_secs(secs);
        let event = |secs, sequence| {
            CouchEventDocument::new(
                GameEventEntity::from_log(
                    lobby_id,
                    GameLogEntry::new(GameEventKind::CardDrawn, None, "Host".into()),
                    at(secs),
                ),
                sequence,
            )
            .id
        };

        let mut ids = vec![event(20, 0), event(3, 1), event(3, 0)];
        ids.sort();
        assert!(ids[0].contains(&format!("{:016}::0000", 3_000)));
        assert!(ids[1].contains(&format!("{:016}::0001", 3_000)));
        assert!(ids[2].starts_with(&event_prefix(lobby_id)));
        assert!(ids[2].contains(&format!("{:016}", 20_000)));
    }

    #[test]
    fn player_document_flattens_the_entity() {
        let player = PlayerEntity {
            id: PlayerId::new(),
            lobby_id: Uuid::new_v4(),
            seat: 0,
            name: "Host".into(),
            is_host: true,
            role: None,
            gender: None,
            joined_at: UNIX_EPOCH,
        };
        let doc = CouchPlayerDocument {
            id: player_doc_id(player.lobby_id, player.id),
            rev: None,
            player: player.clone(),
        };

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["name"], "Host");
        assert!(json.get("_rev").is_none());

        let back: CouchPlayerDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back.player, player);
    }
}

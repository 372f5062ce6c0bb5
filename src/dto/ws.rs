use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    dto::lobby::LobbySnapshot,
    state::{lobby::PlayerId, state_machine::GameCommand},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type")]
pub enum PlayerInboundMessage {
    /// Must be the first frame; binds the socket to a seated player.
    #[serde(rename = "identify")]
    Identify { player_id: PlayerId },
    #[serde(rename = "command")]
    Command {
        #[serde(default)]
        expected_version: Option<u64>,
        command: GameCommand,
    },
    #[serde(other)]
    Unknown,
}

impl PlayerInboundMessage {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerOutboundMessage {
    /// Reply to a valid identify frame.
    Identified {
        player_id: PlayerId,
        lobby: Box<LobbySnapshot>,
    },
    /// A lobby broadcast, named like its SSE counterpart.
    Event {
        event: String,
        #[schema(value_type = Object)]
        data: Value,
    },
    /// A command was accepted; `version` is the lobby version it produced.
    Ack { version: u64 },
    Error { message: String },
}

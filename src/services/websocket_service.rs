use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        lobby::LobbySnapshot,
        sse::ServerEvent,
        ws::{PlayerInboundMessage, PlayerOutboundMessage},
    },
    error::ServiceError,
    services::game_service,
    state::{LobbyHandle, SharedState, lobby::PlayerId, state_machine::GameCommand},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while serving a player socket.
///
/// Distinct from the HTTP-facing [`ServiceError`] so the socket loop can tell
/// a dead connection apart from a rejected move.
#[derive(Debug, Error)]
enum SocketError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// The lobby rejected the command.
    #[error("{0}")]
    Service(#[from] ServiceError),
}

/// Handle the full lifecycle of a player WebSocket bound to one lobby.
pub async fn handle_socket(state: SharedState, handle: Arc<LobbyHandle>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(lobby = %handle.code(), "websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let player_id = match PlayerInboundMessage::from_json_str(&initial_message) {
        Ok(PlayerInboundMessage::Identify { player_id }) => player_id,
        Ok(_) => {
            warn!(lobby = %handle.code(), "first message was not identification");
            reject(&outbound_tx, "identify first");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse player message");
            reject(&outbound_tx, "malformed identification");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Subscribe under the lobby lock so the snapshot and the stream line up.
    let (snapshot, mut events) = {
        let lobby = handle.lobby().lock().await;
        if lobby.player(player_id).is_none() {
            drop(lobby);
            warn!(lobby = %handle.code(), player = %player_id, "unknown player tried to identify");
            reject(&outbound_tx, "player is not part of this lobby");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        (LobbySnapshot::from(&*lobby), handle.hub().subscribe())
    };

    let identified = PlayerOutboundMessage::Identified {
        player_id,
        lobby: Box::new(snapshot),
    };
    if send_message_to_websocket(&outbound_tx, &identified).is_err() {
        finalize(writer_task, outbound_tx).await;
        return;
    }
    info!(lobby = %handle.code(), player = %player_id, "player socket connected");

    let forward_tx = outbound_tx.clone();
    let forward_code = handle.code().to_owned();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if send_message_to_websocket(&forward_tx, &to_outbound(event)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(lobby = %forward_code, skipped, "player socket lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match PlayerInboundMessage::from_json_str(&text) {
                Ok(PlayerInboundMessage::Command {
                    expected_version,
                    command,
                }) => {
                    let res =
                        handle_command(&state, &handle, player_id, expected_version, command, &outbound_tx)
                            .await;
                    if let Err(SocketError::ConnectionClosed) = res {
                        info!(lobby = %handle.code(), player = %player_id, "connection closed during command handling, terminating");
                        break;
                    }
                }
                Ok(PlayerInboundMessage::Identify { .. }) => {
                    debug!(player = %player_id, "ignoring duplicate identification message");
                }
                Ok(PlayerInboundMessage::Unknown) => {
                    if send_error(&outbound_tx, "unknown message type").is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(player = %player_id, error = %err, "failed to parse player message");
                    if send_error(&outbound_tx, "malformed message").is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    info!(lobby = %handle.code(), player = %player_id, "player socket disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Run a command for the socket's player and answer with an ack or the rejection.
async fn handle_command(
    state: &SharedState,
    handle: &Arc<LobbyHandle>,
    player_id: PlayerId,
    expected_version: Option<u64>,
    command: GameCommand,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), SocketError> {
    let result = game_service::execute(state, handle, player_id, expected_version, command)
        .await
        .map_err(SocketError::from);
    match result {
        Ok(lobby) => send_message_to_websocket(
            outbound_tx,
            &PlayerOutboundMessage::Ack {
                version: lobby.version,
            },
        ),
        Err(err) => send_error(outbound_tx, &err.to_string()),
    }
}

fn to_outbound(event: ServerEvent) -> PlayerOutboundMessage {
    let data = serde_json::from_str(&event.data).unwrap_or(serde_json::Value::String(event.data));
    PlayerOutboundMessage::Event {
        event: event.event.unwrap_or_else(|| "message".to_owned()),
        data,
    }
}

fn send_error(tx: &mpsc::UnboundedSender<Message>, message: &str) -> Result<(), SocketError> {
    send_message_to_websocket(
        tx,
        &PlayerOutboundMessage::Error {
            message: message.to_owned(),
        },
    )
}

/// Send an error frame, then close.
fn reject(tx: &mpsc::UnboundedSender<Message>, message: &str) {
    let _ = send_error(tx, message);
    let _ = tx.send(Message::Close(None));
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is
/// reported to the caller.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), SocketError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

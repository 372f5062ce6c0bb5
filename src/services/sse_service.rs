use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{lobby_service, sse_events},
    state::SharedState,
};

/// A new subscription to a lobby stream.
pub struct LobbySubscription {
    /// Join code of the followed lobby.
    pub code: String,
    /// Events sent to this client only, before the shared stream.
    pub greeting: Vec<ServerEvent>,
    pub receiver: broadcast::Receiver<ServerEvent>,
}

/// Subscribe to a lobby's realtime stream.
///
/// The receiver is registered while the lobby lock is held so nothing falls
/// between the greeting snapshot and the first broadcast.
pub async fn subscribe_lobby(
    state: &SharedState,
    code: &str,
) -> Result<LobbySubscription, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let lobby = handle.lobby().lock().await;
    let receiver = handle.hub().subscribe();
    let greeting = sse_events::greeting(state, &lobby);
    Ok(LobbySubscription {
        code: handle.code().to_owned(),
        greeting,
        receiver,
    })
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// logging once the client disconnects.
pub fn to_sse_stream(
    subscription: LobbySubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let LobbySubscription {
        code,
        greeting,
        mut receiver,
    } = subscription;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: greets the client, then relays the broadcast into mpsc
    tokio::spawn(async move {
        for payload in greeting {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            debug!(lobby = %code, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(lobby = %code, "lobby SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::memory_state;

    #[tokio::test]
    async fn greeting_carries_handshake_then_snapshot() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();

        let subscription = subscribe_lobby(&state, &created.lobby.code).await.unwrap();
        let names: Vec<_> = subscription
            .greeting
            .iter()
            .map(|event| event.event.as_deref())
            .collect();
        assert_eq!(
            names,
            vec![
                Some(sse_events::EVENT_HANDSHAKE),
                Some(sse_events::EVENT_LOBBY_SNAPSHOT)
            ]
        );
        assert!(subscription.greeting[0].data.contains("\"degraded\":false"));
    }

    #[tokio::test]
    async fn subscribers_see_later_mutations() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();
        let mut subscription = subscribe_lobby(&state, &created.lobby.code).await.unwrap();

        lobby_service::join_lobby(&state, &created.lobby.code)
            .await
            .unwrap();

        let first = subscription.receiver.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(sse_events::EVENT_GAME_EVENT));
        assert!(first.data.contains("player_joined"));
        let second = subscription.receiver.recv().await.unwrap();
        assert_eq!(second.event.as_deref(), Some(sse_events::EVENT_LOBBY_SNAPSHOT));
    }

    #[tokio::test]
    async fn storage_status_reaches_every_lobby() {
        let (state, _store) = memory_state().await;
        tokio::spawn(sse_events::run_status_broadcaster(state.clone()));
        let created = lobby_service::create_lobby(&state).await.unwrap();
        let mut subscription = subscribe_lobby(&state, &created.lobby.code).await.unwrap();
        tokio::task::yield_now().await;

        state.update_degraded(true);
        let status = subscription.receiver.recv().await.unwrap();
        assert_eq!(status.event.as_deref(), Some(sse_events::EVENT_SYSTEM_STATUS));
        assert_eq!(status.data, r#"{"degraded":true}"#);
    }
}

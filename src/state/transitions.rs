use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{
    dao::models::{GameEventEntity, StoredLobby},
    error::ServiceError,
    services::sse_events,
    state::{
        LobbyHandle, SharedState,
        lobby::Lobby,
        state_machine::{CommandContext, CommandError, GameLogEntry},
    },
};

/// Apply `work` to a live lobby under its lock, then persist and broadcast the result.
///
/// The mutation runs against a copy that replaces the lobby only on success. When
/// `expected_version` is set and the lobby has moved on, nothing runs and
/// [`ServiceError::StaleVersion`] is returned. Returns the value produced by `work`
/// with a snapshot of the committed lobby.
pub async fn run_mutation<T, F>(
    state: &SharedState,
    handle: &LobbyHandle,
    expected_version: Option<u64>,
    work: F,
) -> Result<(T, Lobby), ServiceError>
where
    F: FnOnce(&mut Lobby, &mut CommandContext<'_>) -> Result<T, CommandError>,
{
    let (value, lobby, history) = {
        let mut guard = handle.lobby().lock().await;
        if guard.players.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "lobby `{}` has closed",
                handle.code()
            )));
        }
        match expected_version {
            Some(expected) if expected != guard.version => {
                return Err(ServiceError::StaleVersion {
                    expected,
                    actual: guard.version,
                });
            }
            _ => {}
        }

        let now = SystemTime::now();
        let mut rng = rand::rng();
        let mut ctx = CommandContext::new(state.rules(), &mut rng, now);
        let mut next = guard.clone();
        let value = work(&mut next, &mut ctx)?;
        next.commit(now);
        let entries = ctx.into_events();

        *guard = next;
        let history = announce(state, handle, &guard, entries);
        (value, guard.clone(), history)
    };

    record_history(state, history).await;
    Ok((value, lobby))
}

/// Queue the lobby for persistence and push it to subscribers.
///
/// Must be called while the lobby lock is held so saves and broadcasts keep
/// version order. A lobby without players is dropped from memory and storage.
/// Returns the history rows still to be written.
pub(crate) fn announce(
    state: &SharedState,
    handle: &LobbyHandle,
    lobby: &Lobby,
    entries: Vec<GameLogEntry>,
) -> Vec<GameEventEntity> {
    if lobby.players.is_empty() {
        info!(lobby = %handle.code(), "last player left; closing lobby");
        state.remove_lobby(handle.code());
        state.persistence().delete(lobby.id);
        return Vec::new();
    }

    state.persistence().save(StoredLobby::from(lobby));

    let history: Vec<GameEventEntity> = entries
        .into_iter()
        .map(|entry| GameEventEntity::from_log(lobby.id, entry, lobby.updated_at))
        .collect();
    for event in &history {
        sse_events::broadcast_game_event(handle.hub(), event);
    }
    sse_events::broadcast_snapshot(handle.hub(), lobby);
    history
}

/// Append history rows; a failure is logged and play continues.
pub(crate) async fn record_history(state: &SharedState, history: Vec<GameEventEntity>) {
    if history.is_empty() {
        return;
    }

    match state.require_lobby_store().await {
        Ok(store) => {
            if let Err(err) = store.append_events(history).await {
                warn!(error = %err, "failed to record game history");
            }
        }
        Err(_) => debug!(
            entries = history.len(),
            "storage degraded; game history not recorded"
        ),
    }
}

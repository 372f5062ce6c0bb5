use std::{sync::Arc, time::SystemTime};

use rand::Rng;
use tracing::{info, warn};

use crate::{
    dto::{
        lobby::{JoinResponse, LobbySnapshot, PlayerSessionResponse, PlayerView},
        validation::{LOBBY_CODE_LEN, validate_lobby_code},
    },
    error::ServiceError,
    services::game_service,
    state::{
        LobbyHandle, SharedState,
        lobby::{Gender, Lobby, PlayerId},
        state_machine::CommandContext,
        transitions::{announce, record_history, run_mutation},
    },
};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 16;

/// Open a new lobby; the caller joins it as host.
pub async fn create_lobby(state: &SharedState) -> Result<JoinResponse, ServiceError> {
    let code = generate_code(state).await?;
    let host = PlayerId::new();

    let now = SystemTime::now();
    let (lobby, entries) = {
        let mut rng = rand::rng();
        let mut ctx = CommandContext::new(state.rules(), &mut rng, now);
        let mut lobby = Lobby::open(code, host, &mut ctx);
        lobby.commit(now);
        (lobby, ctx.into_events())
    };

    let handle = state.install_lobby(lobby);
    let (snapshot, history) = {
        let guard = handle.lobby().lock().await;
        let history = announce(state, &handle, &guard, entries);
        (LobbySnapshot::from(&*guard), history)
    };
    record_history(state, history).await;

    info!(lobby = %handle.code(), host = %host, "lobby created");
    Ok(JoinResponse {
        player_id: host,
        lobby: snapshot,
    })
}

/// Find a lobby by join code, loading it from the store when it is not live.
pub async fn resolve(state: &SharedState, code: &str) -> Result<Arc<LobbyHandle>, ServiceError> {
    let code = code.trim().to_ascii_uppercase();
    validate_lobby_code(&code).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| "invalid lobby code".into()),
        )
    })?;

    if let Some(handle) = state.cached_lobby(&code) {
        return Ok(handle);
    }

    let missing = || ServiceError::NotFound(format!("lobby `{code}` not found"));
    let Some(store) = state.lobby_store().await else {
        return Err(missing());
    };
    if state.is_degraded() {
        return Err(missing());
    }

    let Some(stored) = store.find_lobby_by_code(code.clone()).await? else {
        return Err(missing());
    };
    let lobby = Lobby::try_from(stored)?;
    info!(lobby = %code, version = lobby.version, "lobby restored from storage");
    let handle = state.install_lobby(lobby.clone());
    game_service::schedule_nightman_timeout(state, &handle, None, &lobby);
    Ok(handle)
}

/// Current snapshot of a lobby.
pub async fn get_lobby(state: &SharedState, code: &str) -> Result<LobbySnapshot, ServiceError> {
    let handle = resolve(state, code).await?;
    let guard = handle.lobby().lock().await;
    Ok(LobbySnapshot::from(&*guard))
}

/// Seat a new player while the lobby is still gathering.
pub async fn join_lobby(state: &SharedState, code: &str) -> Result<JoinResponse, ServiceError> {
    let handle = resolve(state, code).await?;
    let player_id = PlayerId::new();
    let (_, lobby) = run_mutation(state, &handle, None, |lobby, ctx| {
        lobby.join(player_id, ctx)
    })
    .await?;

    info!(lobby = %handle.code(), player = %player_id, players = lobby.players.len(), "player joined");
    Ok(JoinResponse {
        player_id,
        lobby: LobbySnapshot::from(&lobby),
    })
}

/// Confirm a stored player id still has a seat, for reconnecting clients.
pub async fn verify_player(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<PlayerSessionResponse, ServiceError> {
    let handle = resolve(state, code).await?;
    let guard = handle.lobby().lock().await;
    let player = guard.player(player_id).ok_or_else(|| {
        ServiceError::NotFound(format!("player `{player_id}` is not part of this lobby"))
    })?;

    Ok(PlayerSessionResponse {
        player: PlayerView::from(player),
        lobby: LobbySnapshot::from(&*guard),
    })
}

/// Rename a player or change their gender.
pub async fn update_player(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
    name: Option<String>,
    gender: Option<Option<Gender>>,
) -> Result<LobbySnapshot, ServiceError> {
    let handle = resolve(state, code).await?;
    let (_, lobby) = run_mutation(state, &handle, None, |lobby, _ctx| {
        lobby.update_player(player_id, name, gender)
    })
    .await?;
    Ok(LobbySnapshot::from(&lobby))
}

/// Remove a player; the lobby closes once nobody is left.
pub async fn leave_lobby(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<(), ServiceError> {
    let handle = resolve(state, code).await?;
    let (_, lobby) = run_mutation(state, &handle, None, |lobby, ctx| {
        lobby.leave(player_id, ctx)
    })
    .await?;

    info!(lobby = %handle.code(), player = %player_id, remaining = lobby.players.len(), "player left");
    Ok(())
}

/// Host-only: start dealing turns.
pub async fn start_game(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
    expected_version: Option<u64>,
) -> Result<LobbySnapshot, ServiceError> {
    let handle = resolve(state, code).await?;
    let (_, lobby) = run_mutation(state, &handle, expected_version, |lobby, ctx| {
        lobby.start(player_id, ctx)
    })
    .await?;

    info!(lobby = %handle.code(), first = ?lobby.current_player_id, "game started");
    Ok(LobbySnapshot::from(&lobby))
}

/// Host-only: fresh deck and a clean table.
pub async fn reset_game(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
    expected_version: Option<u64>,
) -> Result<LobbySnapshot, ServiceError> {
    let handle = resolve(state, code).await?;
    let (_, lobby) = run_mutation(state, &handle, expected_version, |lobby, ctx| {
        lobby.reset(player_id, ctx)
    })
    .await?;

    info!(lobby = %handle.code(), "game reset");
    Ok(LobbySnapshot::from(&lobby))
}

/// Draw join codes until one is free in memory and in storage.
async fn generate_code(state: &SharedState) -> Result<String, ServiceError> {
    let store = state.lobby_store().await.filter(|_| !state.is_degraded());

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = random_code(&mut rand::rng());
        if state.cached_lobby(&code).is_some() {
            continue;
        }
        if let Some(store) = &store {
            match store.find_lobby_by_code(code.clone()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => warn!(error = %err, "could not check code uniqueness in storage"),
            }
        }
        return Ok(code);
    }

    Err(ServiceError::InvalidState(
        "could not allocate a free lobby code".into(),
    ))
}

fn random_code(rng: &mut impl Rng) -> String {
    (0..LOBBY_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::{lobby::LobbyStatus, testing::memory_state};

    #[test]
    fn codes_use_the_join_alphabet() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let code = random_code(&mut rng);
            assert!(validate_lobby_code(&code).is_ok(), "{code}");
        }
    }

    #[tokio::test]
    async fn host_creates_and_others_join_in_order() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        assert_eq!(created.lobby.players[0].name, "Host");
        assert!(created.lobby.players[0].is_host);

        let code = created.lobby.code.to_lowercase();
        let second = join_lobby(&state, &code).await.unwrap();
        let third = join_lobby(&state, &code).await.unwrap();
        let names: Vec<_> = third.lobby.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Player 2", "Player 3"]);
        assert_ne!(second.player_id, third.player_id);
    }

    #[tokio::test]
    async fn joining_after_start_is_refused() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();

        let started = start_game(&state, &code, created.player_id, None).await.unwrap();
        assert_eq!(started.status, LobbyStatus::Playing);
        assert_eq!(started.turn_number, 1);

        let err = join_lobby(&state, &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn only_the_host_starts() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        let guest = join_lobby(&state, &code).await.unwrap();

        let err = start_game(&state, &code, guest.player_id, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn stale_versions_are_rejected() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        join_lobby(&state, &code).await.unwrap();

        let err = start_game(&state, &code, created.player_id, Some(created.lobby.version))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::StaleVersion { .. }));
    }

    #[tokio::test]
    async fn blank_names_are_rejected_and_names_are_trimmed() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();

        let err = update_player(&state, &code, created.player_id, Some("   ".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let updated = update_player(
            &state,
            &code,
            created.player_id,
            Some("  Frank ".into()),
            Some(Some(Gender::Male)),
        )
        .await
        .unwrap();
        assert_eq!(updated.players[0].name, "Frank");
        assert_eq!(updated.players[0].gender, Some(Gender::Male));
    }

    #[tokio::test]
    async fn host_leaving_migrates_and_last_leave_closes() {
        let (state, store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        let guest = join_lobby(&state, &code).await.unwrap();

        leave_lobby(&state, &code, created.player_id).await.unwrap();
        let snapshot = get_lobby(&state, &code).await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, guest.player_id);
        assert!(snapshot.players[0].is_host);

        leave_lobby(&state, &code, guest.player_id).await.unwrap();
        assert!(state.cached_lobby(&code).is_none());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.lobby_count(), 0);
        assert!(matches!(
            get_lobby(&state, &code).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn evicted_lobbies_reload_from_storage() {
        let (state, _store) = memory_state().await;
        let created = create_lobby(&state).await.unwrap();
        let code = created.lobby.code.clone();
        tokio::time::sleep(Duration::from_millis(60)).await;

        state.remove_lobby(&code);
        let session = verify_player(&state, &code, created.player_id).await.unwrap();
        assert_eq!(session.player.name, "Host");
        assert_eq!(session.lobby.version, created.lobby.version);

        let err = verify_player(&state, &code, PlayerId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}

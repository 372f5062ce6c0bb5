use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{command::validate_command, lobby::LobbySnapshot},
    error::ServiceError,
    services::lobby_service,
    state::{
        LobbyHandle, SharedState,
        lobby::{Lobby, PlayerId},
        prompt::PromptKind,
        state_machine::GameCommand,
        transitions::run_mutation,
    },
};

/// Apply a player's move to the lobby behind `code`.
pub async fn apply_command(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
    expected_version: Option<u64>,
    command: GameCommand,
) -> Result<LobbySnapshot, ServiceError> {
    let handle = lobby_service::resolve(state, code).await?;
    let lobby = execute(state, &handle, player_id, expected_version, command).await?;
    Ok(LobbySnapshot::from(&lobby))
}

/// Apply a player's move to a live lobby and arm any timer the move opened.
pub async fn execute(
    state: &SharedState,
    handle: &Arc<LobbyHandle>,
    player_id: PlayerId,
    expected_version: Option<u64>,
    command: GameCommand,
) -> Result<Lobby, ServiceError> {
    let name = command.name();
    if let Err(err) = validate_command(&command) {
        let message = err
            .message
            .map(|message| message.into_owned())
            .unwrap_or_else(|| format!("invalid `{name}` command"));
        debug!(lobby = %handle.code(), player = %player_id, command = name, "command rejected before apply");
        return Err(ServiceError::InvalidInput(message));
    }

    let result = run_mutation(state, handle, expected_version, |lobby, ctx| {
        let previous = lobby.active_prompt.as_ref().map(|prompt| prompt.id);
        lobby.apply(player_id, command, ctx)?;
        Ok(previous)
    })
    .await;

    match result {
        Ok((previous, lobby)) => {
            debug!(lobby = %handle.code(), player = %player_id, command = name, version = lobby.version, "command applied");
            schedule_nightman_timeout(state, handle, previous, &lobby);
            Ok(lobby)
        }
        Err(err) => {
            debug!(lobby = %handle.code(), player = %player_id, command = name, error = %err, "command rejected");
            Err(err)
        }
    }
}

/// Arm the expiry of a nightman call-out that was not active before `previous`.
///
/// The timer only resolves the exact prompt it was armed for; anything newer is
/// left alone.
pub(crate) fn schedule_nightman_timeout(
    state: &SharedState,
    handle: &Arc<LobbyHandle>,
    previous: Option<Uuid>,
    lobby: &Lobby,
) {
    let Some(prompt) = lobby.active_prompt.as_ref() else {
        return;
    };
    let PromptKind::NightmanResponse { deadline_ms, .. } = prompt.kind else {
        return;
    };
    if previous == Some(prompt.id) {
        return;
    }

    let prompt_id = prompt.id;
    let delay = Duration::from_millis(deadline_ms.saturating_sub(epoch_ms()));
    let state = state.clone();
    let handle = handle.clone();
    debug!(lobby = %handle.code(), prompt = %prompt_id, ?delay, "nightman timer armed");

    tokio::spawn(async move {
        sleep(delay).await;
        let result = run_mutation(&state, &handle, None, |lobby, ctx| {
            lobby.expire_nightman(prompt_id, ctx)
        })
        .await;
        match result {
            Ok(_) => info!(lobby = %handle.code(), prompt = %prompt_id, "nightman ran out of time"),
            Err(err) => {
                debug!(lobby = %handle.code(), prompt = %prompt_id, error = %err, "nightman timer no longer applies")
            }
        }
    });
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        lobby::{DaymanNightman, LobbyStatus, Role},
        testing::memory_state,
    };

    async fn started_pair(state: &SharedState) -> (String, PlayerId, PlayerId) {
        let created = lobby_service::create_lobby(state).await.unwrap();
        let code = created.lobby.code.clone();
        let guest = lobby_service::join_lobby(state, &code).await.unwrap();
        lobby_service::start_game(state, &code, created.player_id, None)
            .await
            .unwrap();
        (code, created.player_id, guest.player_id)
    }

    #[tokio::test]
    async fn only_the_current_player_draws() {
        let (state, _store) = memory_state().await;
        let (code, host, guest) = started_pair(&state).await;
        let current = lobby_service::get_lobby(&state, &code)
            .await
            .unwrap()
            .current_player_id
            .unwrap();
        let waiting = if current == host { guest } else { host };

        let err = apply_command(&state, &code, waiting, None, GameCommand::DrawCard { position: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let snapshot = apply_command(&state, &code, current, None, GameCommand::DrawCard { position: 0 })
            .await
            .unwrap();
        assert!(snapshot.deck[0].drawn);
        assert!(snapshot.deck[0].code.is_some());
        assert_eq!(snapshot.cards_remaining, 51);
    }

    #[tokio::test]
    async fn oversized_text_is_refused_on_every_transport() {
        let (state, _store) = memory_state().await;
        let (code, host, _guest) = started_pair(&state).await;
        let handle = lobby_service::resolve(&state, &code).await.unwrap();
        let version = handle.lobby().lock().await.version;

        let err = execute(
            &state,
            &handle,
            host,
            None,
            GameCommand::SubmitWord {
                word: "w".repeat(5000),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(handle.lobby().lock().await.version, version);
    }

    #[tokio::test]
    async fn commands_require_a_running_game() {
        let (state, _store) = memory_state().await;
        let created = lobby_service::create_lobby(&state).await.unwrap();

        let err = apply_command(
            &state,
            &created.lobby.code,
            created.player_id,
            None,
            GameCommand::DrawCard { position: 0 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_outs_make_the_nightman_drink() {
        let (state, _store) = memory_state().await;
        let (code, host, guest) = started_pair(&state).await;
        let handle = lobby_service::resolve(&state, &code).await.unwrap();
        {
            let mut lobby = handle.lobby().lock().await;
            assert_eq!(lobby.status, LobbyStatus::Playing);
            if let Some(player) = lobby.players.iter_mut().find(|player| player.id == host) {
                player.role = Some(Role::Charlie);
            }
            lobby.dayman_nightman = Some(DaymanNightman {
                dayman: host,
                nightman: guest,
                rounds_remaining: 3,
            });
        }

        let called = apply_command(&state, &code, host, None, GameCommand::DaymanCallOut)
            .await
            .unwrap();
        assert!(matches!(
            called.active_prompt.map(|prompt| prompt.kind),
            Some(PromptKind::NightmanResponse { .. })
        ));

        sleep(Duration::from_secs(state.rules().nightman_response_secs + 1)).await;

        let lobby = handle.lobby().lock().await;
        let drink = lobby
            .active_prompt
            .as_ref()
            .and_then(|prompt| prompt.drink())
            .expect("nightman drink prompt");
        assert!(drink.drinkers.contains(&guest));
    }
}

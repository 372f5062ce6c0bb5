pub mod cards;
pub mod lobby;
pub mod minigames;
pub mod prompt;
mod roles;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{
    config::{AppConfig, GameRules},
    dao::lobby_store::LobbyStore,
    error::ServiceError,
    services::persistence::PersistenceQueue,
    state::lobby::Lobby,
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const LOBBY_HUB_CAPACITY: usize = 64;

/// A live lobby: the authoritative record behind its own lock, plus the hub its
/// subscribers listen on.
pub struct LobbyHandle {
    id: Uuid,
    code: String,
    lobby: Mutex<Lobby>,
    hub: SseHub,
}

impl LobbyHandle {
    fn new(lobby: Lobby) -> Self {
        Self {
            id: lobby.id,
            code: lobby.code.clone(),
            lobby: Mutex::new(lobby),
            hub: SseHub::new(LOBBY_HUB_CAPACITY),
        }
    }

    /// Stable lobby identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join code of the lobby.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Lock guarding the lobby record; commands on one lobby are serialized through it.
    pub fn lobby(&self) -> &Mutex<Lobby> {
        &self.lobby
    }

    /// Broadcast hub for this lobby's realtime subscribers.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }
}

/// Central application state storing live lobbies and the storage handle.
pub struct AppState {
    config: Arc<AppConfig>,
    lobby_store: RwLock<Option<Arc<dyn LobbyStore>>>,
    lobbies: DashMap<String, Arc<LobbyHandle>>,
    degraded: watch::Sender<bool>,
    persistence: PersistenceQueue,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, persistence: PersistenceQueue) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            lobby_store: RwLock::new(None),
            lobbies: DashMap::new(),
            degraded: degraded_tx,
            persistence,
        })
    }

    /// Loaded application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Table rules every lobby plays by.
    pub fn rules(&self) -> &GameRules {
        self.config.rules()
    }

    /// Obtain a handle to the current lobby store, if one is installed.
    pub async fn lobby_store(&self) -> Option<Arc<dyn LobbyStore>> {
        let guard = self.lobby_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_lobby_store(&self) -> Result<Arc<dyn LobbyStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.lobby_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new lobby store implementation and leave degraded mode.
    pub async fn set_lobby_store(&self, store: Arc<dyn LobbyStore>) {
        {
            let mut guard = self.lobby_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Live lobbies keyed by join code.
    pub fn lobbies(&self) -> &DashMap<String, Arc<LobbyHandle>> {
        &self.lobbies
    }

    /// Live lobby for `code`, if it is loaded.
    pub fn cached_lobby(&self, code: &str) -> Option<Arc<LobbyHandle>> {
        self.lobbies.get(code).map(|entry| entry.value().clone())
    }

    /// Register a lobby, keeping the already-loaded handle if another request won the race.
    pub fn install_lobby(&self, lobby: Lobby) -> Arc<LobbyHandle> {
        self.lobbies
            .entry(lobby.code.clone())
            .or_insert_with(|| Arc::new(LobbyHandle::new(lobby)))
            .value()
            .clone()
    }

    /// Forget a live lobby.
    pub fn remove_lobby(&self, code: &str) {
        self.lobbies.remove(code);
    }

    /// Write-behind queue for lobby and player records.
    pub fn persistence(&self) -> &PersistenceQueue {
        &self.persistence
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::persistence;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let (queue, _worker) = persistence::channel(Duration::from_millis(10));
        let state = AppState::new(AppConfig::default(), queue);
        let mut watcher = state.degraded_watcher();

        assert!(state.is_degraded());
        assert!(matches!(
            state.require_lobby_store().await,
            Err(ServiceError::Degraded)
        ));

        state.set_lobby_store(Arc::new(
            crate::dao::lobby_store::memory::MemoryLobbyStore::default(),
        ))
        .await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_lobby_store().await.is_ok());

        state.update_degraded(false);
        assert!(!watcher.has_changed().unwrap());
    }
}

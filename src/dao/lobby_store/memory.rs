//! Process-local store used when no database is configured, and by the tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    lobby_store::{LobbyStore, keep_newest},
    models::{ChatMessageEntity, GameEventEntity, StoredLobby},
    storage::{StorageError, StorageResult},
};

/// Lobby store keeping every table in concurrent hash maps.
#[derive(Clone, Default)]
pub struct MemoryLobbyStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    lobbies: DashMap<Uuid, StoredLobby>,
    chat: DashMap<Uuid, Vec<ChatMessageEntity>>,
    events: DashMap<Uuid, Vec<GameEventEntity>>,
    offline: AtomicBool,
}

impl MemoryLobbyStore {
    /// Number of lobbies currently stored.
    pub fn lobby_count(&self) -> usize {
        self.inner.lobbies.len()
    }

    /// Stored copy of a lobby, by id.
    pub fn stored(&self, id: Uuid) -> Option<StoredLobby> {
        self.inner.lobbies.get(&id).map(|entry| entry.value().clone())
    }

    /// Make health checks and reconnects fail, as an unreachable database would.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory store is offline".into(),
                io::Error::other("offline"),
            ));
        }
        Ok(())
    }
}

impl LobbyStore for MemoryLobbyStore {
    fn save_lobby(&self, lobby: StoredLobby) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.lobbies.insert(lobby.lobby.id, lobby);
            Ok(())
        })
    }

    fn find_lobby_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<StoredLobby>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .lobbies
                .iter()
                .find(|entry| entry.value().lobby.code == code)
                .map(|entry| entry.value().clone()))
        })
    }

    fn delete_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.lobbies.remove(&id);
            store.inner.chat.remove(&id);
            store.inner.events.remove(&id);
            Ok(())
        })
    }

    fn append_chat(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .chat
                .entry(message.lobby_id)
                .or_default()
                .push(message);
            Ok(())
        })
    }

    fn list_chat(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rows = store
                .inner
                .chat
                .get(&lobby_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            rows.sort_by_key(|row| row.created_at);
            Ok(keep_newest(rows, limit))
        })
    }

    fn append_events(&self, events: Vec<GameEventEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for event in events {
                store
                    .inner
                    .events
                    .entry(event.lobby_id)
                    .or_default()
                    .push(event);
            }
            Ok(())
        })
    }

    fn list_events(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .inner
                .events
                .get(&lobby_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            // Insertion order is the order entries were produced in.
            let mut newest = keep_newest(rows, limit);
            newest.reverse();
            Ok(newest)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.reachable();
        Box::pin(async move { result })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.reachable();
        Box::pin(async move { result })
    }
}

#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ChatMessageEntity, GameEventEntity, StoredLobby};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for lobbies, players, chat and history.
pub trait LobbyStore: Send + Sync {
    /// Upsert the lobby row and replace its player rows.
    fn save_lobby(&self, lobby: StoredLobby) -> BoxFuture<'static, StorageResult<()>>;
    /// Look a lobby up by its join code.
    fn find_lobby_by_code(&self, code: String)
    -> BoxFuture<'static, StorageResult<Option<StoredLobby>>>;
    /// Remove a lobby with its players, chat and history.
    fn delete_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    fn append_chat(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// The newest `limit` chat messages, oldest first.
    fn list_chat(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    fn append_events(&self, events: Vec<GameEventEntity>) -> BoxFuture<'static, StorageResult<()>>;
    /// The newest `limit` history entries, newest first.
    fn list_events(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Keep the newest `limit` rows of a chronologically sorted list.
pub(crate) fn keep_newest<T>(mut rows: Vec<T>, limit: usize) -> Vec<T> {
    if rows.len() > limit {
        rows.drain(..rows.len() - limit);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_newest_drops_the_oldest_rows() {
        assert_eq!(keep_newest(vec![1, 2, 3, 4], 2), vec![3, 4]);
        assert_eq!(keep_newest(vec![1, 2], 5), vec![1, 2]);
    }
}

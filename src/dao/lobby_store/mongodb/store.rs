use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoChatDocument, MongoEventDocument, MongoLobbyDocument, MongoPlayerDocument},
};
use crate::dao::{
    lobby_store::LobbyStore,
    models::{ChatMessageEntity, GameEventEntity, LobbyEntity, PlayerEntity, StoredLobby},
    storage::StorageResult,
};

const LOBBY_COLLECTION: &str = "lobbies";
const PLAYER_COLLECTION: &str = "players";
const CHAT_COLLECTION: &str = "chat_messages";
const EVENT_COLLECTION: &str = "game_events";

#[derive(Clone)]
pub struct MongoLobbyStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLobbyStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document, bool); 4] = [
            (LOBBY_COLLECTION, "code", doc! {"code": 1}, true),
            (PLAYER_COLLECTION, "lobby_id,seat", doc! {"lobby_id": 1, "seat": 1}, false),
            (
                CHAT_COLLECTION,
                "lobby_id,created_at",
                doc! {"lobby_id": 1, "created_at": -1},
                false,
            ),
            (
                EVENT_COLLECTION,
                "lobby_id,created_at",
                doc! {"lobby_id": 1, "created_at": -1, "sequence": -1},
                false,
            ),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn save_lobby(&self, stored: StoredLobby) -> MongoResult<()> {
        let StoredLobby { lobby, players } = stored;
        let id = lobby.id;
        let lobby_key = id.to_string();

        let document: MongoLobbyDocument = lobby.into();
        self.collection::<MongoLobbyDocument>(LOBBY_COLLECTION)
            .await
            .replace_one(doc! {"_id": &lobby_key}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveLobby { id, source })?;

        let player_collection = self.collection::<MongoPlayerDocument>(PLAYER_COLLECTION).await;
        let seated: Vec<String> = players.iter().map(|player| player.id.to_string()).collect();
        player_collection
            .delete_many(doc! {"lobby_id": &lobby_key, "_id": {"$nin": seated}})
            .await
            .map_err(|source| MongoDaoError::SaveLobby { id, source })?;

        for player in players {
            let key = player.id.to_string();
            let document: MongoPlayerDocument = player.into();
            player_collection
                .replace_one(doc! {"_id": key}, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveLobby { id, source })?;
        }

        Ok(())
    }

    async fn find_lobby_by_code(&self, code: String) -> MongoResult<Option<StoredLobby>> {
        let document = self
            .collection::<MongoLobbyDocument>(LOBBY_COLLECTION)
            .await
            .find_one(doc! {"code": &code})
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                code: code.clone(),
                source,
            })?;

        let Some(document) = document else {
            return Ok(None);
        };
        let lobby: LobbyEntity = document.try_into()?;
        let lobby_key = lobby.id.to_string();

        let player_docs: Vec<MongoPlayerDocument> = self
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION)
            .await
            .find(doc! {"lobby_id": &lobby_key})
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                code: code.clone(),
                source,
            })?;

        let players = player_docs
            .into_iter()
            .map(PlayerEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(Some(StoredLobby { lobby, players }))
    }

    async fn delete_lobby(&self, id: Uuid) -> MongoResult<()> {
        let key = id.to_string();
        self.collection::<Document>(LOBBY_COLLECTION)
            .await
            .delete_one(doc! {"_id": &key})
            .await
            .map_err(|source| MongoDaoError::DeleteLobby { id, source })?;

        for collection in [PLAYER_COLLECTION, CHAT_COLLECTION, EVENT_COLLECTION] {
            self.collection::<Document>(collection)
                .await
                .delete_many(doc! {"lobby_id": &key})
                .await
                .map_err(|source| MongoDaoError::DeleteLobby { id, source })?;
        }
        Ok(())
    }

    async fn append_chat(&self, message: ChatMessageEntity) -> MongoResult<()> {
        let lobby_id = message.lobby_id;
        let document: MongoChatDocument = message.into();
        self.collection::<MongoChatDocument>(CHAT_COLLECTION)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendLog {
                collection: CHAT_COLLECTION,
                lobby_id,
                source,
            })?;
        Ok(())
    }

    async fn list_chat(&self, lobby_id: Uuid, limit: usize) -> MongoResult<Vec<ChatMessageEntity>> {
        let list_err = |source| MongoDaoError::ListLog {
            collection: CHAT_COLLECTION,
            lobby_id,
            source,
        };
        let documents: Vec<MongoChatDocument> = self
            .collection::<MongoChatDocument>(CHAT_COLLECTION)
            .await
            .find(doc! {"lobby_id": lobby_id.to_string()})
            .sort(doc! {"created_at": -1})
            .limit(limit as i64)
            .await
            .map_err(list_err)?
            .try_collect()
            .await
            .map_err(list_err)?;

        let mut rows = documents
            .into_iter()
            .map(ChatMessageEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    async fn append_events(&self, events: Vec<GameEventEntity>) -> MongoResult<()> {
        let Some(lobby_id) = events.first().map(|event| event.lobby_id) else {
            return Ok(());
        };
        let documents: Vec<MongoEventDocument> = events
            .into_iter()
            .enumerate()
            .map(|(sequence, event)| MongoEventDocument::new(event, sequence as u32))
            .collect();

        self.collection::<MongoEventDocument>(EVENT_COLLECTION)
            .await
            .insert_many(&documents)
            .await
            .map_err(|source| MongoDaoError::AppendLog {
                collection: EVENT_COLLECTION,
                lobby_id,
                source,
            })?;
        Ok(())
    }

    async fn list_events(&self, lobby_id: Uuid, limit: usize) -> MongoResult<Vec<GameEventEntity>> {
        let list_err = |source| MongoDaoError::ListLog {
            collection: EVENT_COLLECTION,
            lobby_id,
            source,
        };
        let documents: Vec<MongoEventDocument> = self
            .collection::<MongoEventDocument>(EVENT_COLLECTION)
            .await
            .find(doc! {"lobby_id": lobby_id.to_string()})
            .sort(doc! {"created_at": -1, "sequence": -1})
            .limit(limit as i64)
            .await
            .map_err(list_err)?
            .try_collect()
            .await
            .map_err(list_err)?;

        documents
            .into_iter()
            .map(GameEventEntity::try_from)
            .collect()
    }
}

impl LobbyStore for MongoLobbyStore {
    fn save_lobby(&self, lobby: StoredLobby) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_lobby(lobby).await.map_err(Into::into) })
    }

    fn find_lobby_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<StoredLobby>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby_by_code(code).await.map_err(Into::into) })
    }

    fn delete_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_lobby(id).await.map_err(Into::into) })
    }

    fn append_chat(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_chat(message).await.map_err(Into::into) })
    }

    fn list_chat(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_chat(lobby_id, limit).await.map_err(Into::into) })
    }

    fn append_events(&self, events: Vec<GameEventEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_events(events).await.map_err(Into::into) })
    }

    fn list_events(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(lobby_id, limit).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};
use uuid::Uuid;

use crate::dao::{
    lobby_store::{LobbyStore, keep_newest},
    models::{ChatMessageEntity, GameEventEntity, StoredLobby},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkResult, CouchChatDocument, CouchCodeDocument, CouchEventDocument,
        CouchLobbyDocument, CouchPlayerDocument, END_SUFFIX, Tombstone, chat_prefix, code_doc_id,
        event_prefix, lobby_doc_id, player_doc_id, player_prefix,
    },
};

const ALL_DOCS: &str = "_all_docs";
const BULK_DOCS: &str = "_bulk_docs";

#[derive(Clone)]
pub struct CouchLobbyStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

/// A document id with its current revision.
struct Revision {
    id: String,
    rev: String,
}

impl CouchLobbyStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// Rows under `prefix` in key order, or the newest `newest` rows newest first.
    async fn all_docs(&self, prefix: &str, newest: Option<usize>) -> CouchResult<AllDocsResponse> {
        let low = format!("\"{}\"", prefix);
        let high = format!("\"{}{}\"", prefix, END_SUFFIX);
        let mut query = vec![("include_docs", "true".to_string())];
        match newest {
            Some(limit) => {
                query.push(("descending", "true".to_string()));
                query.push(("startkey", high));
                query.push(("endkey", low));
                query.push(("limit", limit.to_string()));
            }
            None => {
                query.push(("startkey", low));
                query.push(("endkey", high));
            }
        }

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            })
    }

    async fn list_documents<T>(&self, prefix: &str, newest: Option<usize>) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let payload = self.all_docs(prefix, newest).await?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: row.id.clone(),
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    async fn revisions(&self, prefix: &str) -> CouchResult<Vec<Revision>> {
        let payload = self.all_docs(prefix, None).await?;
        Ok(payload
            .rows
            .into_iter()
            .map(|row| Revision {
                id: row.id,
                rev: row.value.rev,
            })
            .collect())
    }

    async fn bulk_write(&self, docs: Vec<Value>) -> CouchResult<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, BULK_DOCS)
            .json(&json!({ "docs": docs }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            });
        }

        let results = response.json::<Vec<BulkResult>>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: BULK_DOCS.to_string(),
                source,
            }
        })?;

        match results.into_iter().find(|result| result.error.is_some()) {
            Some(failed) => Err(CouchDaoError::BulkRejected {
                doc_id: failed.id,
                reason: failed
                    .reason
                    .or(failed.error)
                    .unwrap_or_else(|| "unknown".to_owned()),
            }),
            None => Ok(()),
        }
    }

    async fn save_lobby(&self, stored: StoredLobby) -> CouchResult<()> {
        let StoredLobby { lobby, players } = stored;
        let lobby_id = lobby.id;

        let code_id = code_doc_id(&lobby.code);
        if self
            .get_document::<CouchCodeDocument>(&code_id)
            .await?
            .is_none()
        {
            let pointer = CouchCodeDocument {
                id: code_id.clone(),
                rev: None,
                lobby_id,
            };
            self.put_document(&code_id, &pointer).await?;
        }

        let doc_id = lobby_doc_id(lobby_id);
        let existing = self.get_document::<CouchLobbyDocument>(&doc_id).await?;
        let doc = CouchLobbyDocument::from((lobby, existing.and_then(|doc| doc.rev)));
        self.put_document(&doc_id, &doc).await?;

        // Seats are rewritten as a batch; rows of departed players become tombstones.
        let mut stale = self.revisions(&player_prefix(lobby_id)).await?;
        let mut docs = Vec::with_capacity(players.len() + stale.len());
        for player in players {
            let id = player_doc_id(lobby_id, player.id);
            let rev = stale
                .iter()
                .position(|revision| revision.id == id)
                .map(|index| stale.swap_remove(index).rev);
            let document = CouchPlayerDocument { id, rev, player };
            docs.push(to_value(&document.id, &document)?);
        }
        for revision in stale {
            let tombstone = Tombstone::new(revision.id, revision.rev);
            docs.push(to_value(&tombstone.id, &tombstone)?);
        }

        self.bulk_write(docs).await
    }

    async fn find_lobby_by_code(&self, code: &str) -> CouchResult<Option<StoredLobby>> {
        let Some(pointer) = self
            .get_document::<CouchCodeDocument>(&code_doc_id(code))
            .await?
        else {
            return Ok(None);
        };

        let Some(doc) = self
            .get_document::<CouchLobbyDocument>(&lobby_doc_id(pointer.lobby_id))
            .await?
        else {
            return Ok(None);
        };

        let players = self
            .list_documents::<CouchPlayerDocument>(&player_prefix(pointer.lobby_id), None)
            .await?
            .into_iter()
            .map(|doc| doc.player)
            .collect();

        Ok(Some(StoredLobby {
            lobby: doc.lobby,
            players,
        }))
    }

    async fn delete_lobby(&self, id: Uuid) -> CouchResult<()> {
        let mut doomed = Vec::new();

        let doc_id = lobby_doc_id(id);
        if let Some(doc) = self.get_document::<CouchLobbyDocument>(&doc_id).await? {
            let code_id = code_doc_id(&doc.lobby.code);
            if let Some(pointer) = self.get_document::<CouchCodeDocument>(&code_id).await? {
                doomed.extend(pointer.rev.map(|rev| Revision { id: code_id, rev }));
            }
            doomed.extend(doc.rev.map(|rev| Revision { id: doc_id, rev }));
        }

        for prefix in [player_prefix(id), chat_prefix(id), event_prefix(id)] {
            doomed.extend(self.revisions(&prefix).await?);
        }

        let docs = doomed
            .into_iter()
            .map(|revision| {
                let tombstone = Tombstone::new(revision.id, revision.rev);
                to_value(&tombstone.id, &tombstone)
            })
            .collect::<CouchResult<Vec<_>>>()?;
        self.bulk_write(docs).await
    }
}

fn to_value<T: Serialize>(doc_id: &str, document: &T) -> CouchResult<Value> {
    serde_json::to_value(document).map_err(|source| CouchDaoError::SerializeValue {
        doc_id: doc_id.to_owned(),
        source,
    })
}

impl LobbyStore for CouchLobbyStore {
    fn save_lobby(&self, lobby: StoredLobby) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_lobby(lobby).await.map_err(Into::into) })
    }

    fn find_lobby_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<StoredLobby>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby_by_code(&code).await.map_err(Into::into) })
    }

    fn delete_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_lobby(id).await.map_err(Into::into) })
    }

    fn append_chat(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchChatDocument::from(message);
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn list_chat(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchChatDocument>(&chat_prefix(lobby_id), None)
                .await?;
            let rows = docs.into_iter().map(|doc| doc.message).collect();
            Ok(keep_newest(rows, limit))
        })
    }

    fn append_events(&self, events: Vec<GameEventEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = events
                .into_iter()
                .enumerate()
                .map(|(sequence, event)| {
                    let doc = CouchEventDocument::new(event, sequence);
                    to_value(&doc.id, &doc)
                })
                .collect::<CouchResult<Vec<_>>>()?;
            store.bulk_write(docs).await.map_err(Into::into)
        })
    }

    fn list_events(
        &self,
        lobby_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchEventDocument>(&event_prefix(lobby_id), Some(limit))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.event).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

//! Debounced write-behind queue between live lobbies and the store.
//!
//! Mutations enqueue the latest snapshot of their lobby without waiting on the
//! database. The worker keeps one pending write per lobby and flushes once the
//! queue has been quiet for the debounce period. Failed writes stay queued and
//! are retried on the next tick. On shutdown the server drains the queue once.

use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{dao::models::StoredLobby, state::SharedState};

/// A busy queue still flushes after this many debounce periods.
const MAX_DEFER_FACTOR: u32 = 8;

#[derive(Debug, Clone)]
enum PersistRequest {
    Save(StoredLobby),
    Delete,
}

enum QueueMessage {
    Write(Uuid, PersistRequest),
    /// Flush now and stop the worker.
    Drain(oneshot::Sender<()>),
}

/// Producer side of the queue, held by the application state.
#[derive(Clone)]
pub struct PersistenceQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl PersistenceQueue {
    /// Schedule a write of the lobby and its players.
    pub fn save(&self, lobby: StoredLobby) {
        self.send(lobby.lobby.id, PersistRequest::Save(lobby));
    }

    /// Schedule removal of a lobby with everything attached to it.
    pub fn delete(&self, id: Uuid) {
        self.send(id, PersistRequest::Delete);
    }

    /// Write everything still pending and stop the worker.
    pub async fn drain(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(QueueMessage::Drain(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    fn send(&self, id: Uuid, request: PersistRequest) {
        if self.tx.send(QueueMessage::Write(id, request)).is_err() {
            warn!(lobby_id = %id, "persistence worker stopped; dropping write");
        }
    }
}

/// Consumer side of the queue; run it on its own task.
pub struct PersistenceWorker {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
    debounce: Duration,
}

/// Build a queue whose worker waits `debounce` of quiet before writing.
pub fn channel(debounce: Duration) -> (PersistenceQueue, PersistenceWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PersistenceQueue { tx }, PersistenceWorker { rx, debounce })
}

impl PersistenceWorker {
    /// Serve the queue until it is drained or every producer is gone.
    pub async fn run(mut self, state: SharedState) {
        let mut pending: HashMap<Uuid, PersistRequest> = HashMap::new();
        let mut batch_started = Instant::now();
        let mut last_received = Instant::now();

        loop {
            if pending.is_empty() {
                match self.rx.recv().await {
                    Some(QueueMessage::Write(id, request)) => {
                        pending.insert(id, request);
                        batch_started = Instant::now();
                        last_received = batch_started;
                    }
                    Some(QueueMessage::Drain(ack)) => {
                        let _ = ack.send(());
                        break;
                    }
                    None => break,
                }
                continue;
            }

            let deadline = (last_received + self.debounce)
                .min(batch_started + self.debounce * MAX_DEFER_FACTOR);

            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(QueueMessage::Write(id, request)) => {
                        pending.insert(id, request);
                        last_received = Instant::now();
                    }
                    Some(QueueMessage::Drain(ack)) => {
                        flush(&state, &mut pending).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        flush(&state, &mut pending).await;
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    flush(&state, &mut pending).await;
                    batch_started = Instant::now();
                    last_received = batch_started;
                }
            }
        }

        if !pending.is_empty() {
            warn!(pending = pending.len(), "persistence worker exiting with unsaved lobbies");
        }
        info!("persistence worker stopped");
    }
}

/// Write every pending request, keeping the ones that failed.
async fn flush(state: &SharedState, pending: &mut HashMap<Uuid, PersistRequest>) {
    let store = match state.require_lobby_store().await {
        Ok(store) => store,
        Err(_) => {
            debug!(pending = pending.len(), "storage degraded; postponing lobby writes");
            return;
        }
    };

    let batch = std::mem::take(pending);
    debug!(lobbies = batch.len(), "flushing lobby writes");
    for (id, request) in batch {
        let result = match &request {
            PersistRequest::Save(lobby) => store.save_lobby(lobby.clone()).await,
            PersistRequest::Delete => store.delete_lobby(id).await,
        };
        if let Err(err) = result {
            warn!(lobby_id = %id, error = %err, "lobby write failed; will retry");
            pending.insert(id, request);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        config::{AppConfig, GameRules},
        dao::lobby_store::{LobbyStore, memory::MemoryLobbyStore},
        state::{
            AppState,
            lobby::{Lobby, PlayerId},
            state_machine::CommandContext,
            testing::memory_state,
        },
    };

    fn stored_lobby() -> StoredLobby {
        let rules = GameRules::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        let lobby = Lobby::open("QUEUE1".into(), PlayerId::new(), &mut ctx);
        StoredLobby::from(&lobby)
    }

    #[tokio::test]
    async fn bursts_coalesce_into_the_latest_snapshot() {
        let (state, store) = memory_state().await;
        let mut stored = stored_lobby();
        let id = stored.lobby.id;

        state.persistence().save(stored.clone());
        stored.lobby.version = 7;
        state.persistence().save(stored.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.stored(id).map(|row| row.lobby.version), Some(7));
    }

    #[tokio::test]
    async fn delete_wins_over_a_pending_save() {
        let (state, store) = memory_state().await;
        let stored = stored_lobby();
        let id = stored.lobby.id;

        state.persistence().save(stored);
        state.persistence().delete(id);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.stored(id).is_none());
        assert_eq!(store.lobby_count(), 0);
    }

    #[tokio::test]
    async fn drain_flushes_without_waiting() {
        let (queue, worker) = channel(Duration::from_secs(60));
        let state = AppState::new(AppConfig::default(), queue);
        let store = Arc::new(MemoryLobbyStore::default());
        state
            .set_lobby_store(store.clone() as Arc<dyn LobbyStore>)
            .await;
        let worker = tokio::spawn(worker.run(state.clone()));

        let stored = stored_lobby();
        let id = stored.lobby.id;
        state.persistence().save(stored);
        state.persistence().drain().await;

        assert!(store.stored(id).is_some());
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn writes_wait_out_degraded_mode() {
        let (state, store) = memory_state().await;
        state.update_degraded(true);
        let stored = stored_lobby();
        let id = stored.lobby.id;

        state.persistence().save(stored);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.stored(id).is_none());

        state.update_degraded(false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.stored(id).is_some());
    }
}

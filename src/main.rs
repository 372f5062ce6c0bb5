//! Sunny Deck Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sunny_deck_back::{
    config::AppConfig,
    dao::{
        lobby_store::{LobbyStore, memory::MemoryLobbyStore},
        storage::StorageError,
    },
    routes,
    services::{persistence, sse_events, storage_supervisor},
    state::{AppState, SharedState},
};

/// Storage selected through `STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageBackend {
    Memory,
    Mongo,
    Couch,
}

impl StorageBackend {
    /// Explicit `STORAGE_BACKEND`, otherwise whichever database URL is set.
    fn from_env() -> anyhow::Result<Self> {
        match env::var("STORAGE_BACKEND") {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "memory" => Ok(Self::Memory),
                "mongo" | "mongodb" => Ok(Self::Mongo),
                "couch" | "couchdb" => Ok(Self::Couch),
                other => anyhow::bail!("unknown STORAGE_BACKEND `{other}`"),
            },
            Err(_) if env::var_os("MONGO_URI").is_some() => Ok(Self::Mongo),
            Err(_) if env::var_os("COUCH_BASE_URL").is_some() => Ok(Self::Couch),
            Err(_) => Ok(Self::Memory),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (queue, worker) = persistence::channel(config.persist_debounce());
    let app_state = AppState::new(config, queue);

    let backend = StorageBackend::from_env()?;
    info!(?backend, "selected storage backend");
    spawn_storage(app_state.clone(), backend)?;

    tokio::spawn(worker.run(app_state.clone()));
    tokio::spawn(sse_events::run_status_broadcaster(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.persistence().drain().await;
    info!("server stopped");
    Ok(())
}

/// Start the storage supervisor for the chosen backend.
fn spawn_storage(state: SharedState, backend: StorageBackend) -> anyhow::Result<()> {
    match backend {
        StorageBackend::Memory => {
            let store = MemoryLobbyStore::default();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn LobbyStore>) }
            }));
            warn!("lobbies are kept in memory only and will not survive a restart");
        }
        StorageBackend::Mongo => spawn_mongo(state)?,
        StorageBackend::Couch => spawn_couch(state)?,
    }
    Ok(())
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo(state: SharedState) -> anyhow::Result<()> {
    use sunny_deck_back::dao::lobby_store::mongodb::{MongoConfig, MongoLobbyStore};

    let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let db_name = env::var("MONGO_DB").ok();
    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoLobbyStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn LobbyStore>)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo(_state: SharedState) -> anyhow::Result<()> {
    anyhow::bail!("STORAGE_BACKEND=mongo requires the `mongo-store` feature")
}

#[cfg(feature = "couch-store")]
fn spawn_couch(state: SharedState) -> anyhow::Result<()> {
    use sunny_deck_back::dao::lobby_store::couchdb::{CouchConfig, CouchLobbyStore};

    let config = CouchConfig::from_env().context("reading CouchDB settings")?;
    tokio::spawn(storage_supervisor::run(state, move || {
        let config = config.clone();
        async move {
            let store = CouchLobbyStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn LobbyStore>)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "couch-store"))]
fn spawn_couch(_state: SharedState) -> anyhow::Result<()> {
    anyhow::bail!("STORAGE_BACKEND=couch requires the `couch-store` feature")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

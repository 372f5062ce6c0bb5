use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Lobbies currently loaded in memory.
    pub live_lobbies: usize,
}

impl HealthResponse {
    /// The store answers and writes are flowing.
    pub fn ok(live_lobbies: usize) -> Self {
        Self {
            status: "ok".to_string(),
            live_lobbies,
        }
    }

    /// Play continues in memory but nothing reaches the store.
    pub fn degraded(live_lobbies: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            live_lobbies,
        }
    }
}

use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report storage health while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_lobby_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let live_lobbies = state.lobbies().len();
    if state.is_degraded() {
        HealthResponse::degraded(live_lobbies)
    } else {
        HealthResponse::ok(live_lobbies)
    }
}

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::CommandError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The command was built against an older snapshot of the lobby.
    #[error("lobby changed (expected version {expected}, now {actual})")]
    StaleVersion { expected: u64, actual: u64 },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<CommandError> for ServiceError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::UnknownPlayer(_) => ServiceError::NotFound(err.to_string()),
            CommandError::HostOnly(_) => ServiceError::Unauthorized(err.to_string()),
            CommandError::InvalidInput(message) => ServiceError::InvalidInput(message),
            other => ServiceError::InvalidState(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            stale @ ServiceError::StaleVersion { .. } => AppError::Conflict(stale.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::PlayerId;

    fn status_of(err: CommandError) -> StatusCode {
        AppError::from(ServiceError::from(err))
            .into_response()
            .status()
    }

    #[test]
    fn command_errors_map_to_http_statuses() {
        assert_eq!(status_of(CommandError::NotYourTurn), StatusCode::CONFLICT);
        assert_eq!(status_of(CommandError::AlreadyConfirmed), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CommandError::UnknownPlayer(PlayerId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CommandError::HostOnly("start the game")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(CommandError::InvalidInput("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn stale_versions_conflict() {
        let err = AppError::from(ServiceError::StaleVersion {
            expected: 3,
            actual: 5,
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}

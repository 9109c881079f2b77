use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use relaychat_shared::{PersistenceError, RelayError, Uuid};

/// Errors raised by the in-memory core: indices, identifier allocation,
/// entity creation and relay merging.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Duplicate key in unique index")]
    DuplicateKey,

    /// The indices of one table disagree on membership. Aborts the current
    /// task only.
    #[error("Store inconsistency: {0}")]
    StoreInconsistency(String),

    #[error("Identifier range exhausted")]
    ExhaustedRange,

    #[error("No free identifier after {0} attempts")]
    IdentifierSpaceExhausted(usize),

    #[error("Identifier already in use: {0}")]
    IdInUse(Uuid),

    #[error("Unknown user: {0}")]
    UnknownUser(Uuid),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(Uuid),

    #[error("Unknown message: {0}")]
    UnknownMessage(Uuid),

    #[error("User name already taken: {0}")]
    NameTaken(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Malformed bundle {bundle}: {reason}")]
    MalformedBundle { bundle: Uuid, reason: String },

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Errors of the HTTP surface.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The event loop is gone or dropped the request.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

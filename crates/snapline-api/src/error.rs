use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use snapline_types::api::MessageBody;

/// Failure of a REST handler. Always rendered as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// A referenced post, user, comment or like does not exist
    #[error("{0}")]
    NotFound(String),

    /// Actor is neither the owner nor an allowed delegate
    #[error("{0}")]
    Permission(String),

    /// Storage failed. Logged; the body never carries the cause.
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn permission_denied() -> Self {
        Self::Permission("Permission denied".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Persistence(e) => {
                error!("request failed: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(MessageBody { message })).into_response()
    }
}

//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_shared::ChatError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("{0}")]
    Validation(String),

    // Resource errors
    #[error("{0}")]
    NotFound(String),

    // Internal errors
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),

            // Validation
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),

            // Resources
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotAuthenticated => ApiError::Unauthorized,
            ChatError::Auth(_) => ApiError::InvalidToken,
            ChatError::Validation(msg) => ApiError::Validation(msg),
            other @ (ChatError::RoomNotFound
            | ChatError::MessageNotFound
            | ChatError::UserNotFound) => ApiError::NotFound(other.to_string()),
            ChatError::AccessDenied => ApiError::Forbidden,
            ChatError::Upstream(detail) => {
                tracing::error!(error = %detail, "Upstream failure");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_errors_map_to_status() {
        let cases = [
            (ChatError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (ChatError::validation("bad"), StatusCode::BAD_REQUEST),
            (ChatError::RoomNotFound, StatusCode::NOT_FOUND),
            (ChatError::AccessDenied, StatusCode::FORBIDDEN),
            (
                ChatError::Upstream("db down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_upstream_detail_not_exposed() {
        let err = ApiError::from(ChatError::Upstream("password=hunter2".into()));
        assert_eq!(err.to_string(), "Internal server error");
    }
}

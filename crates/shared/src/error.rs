//! Error types for Huddle

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Validation(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Access denied")]
    AccessDenied,

    /// Persistence, blob storage or notification collaborator failed
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    /// Stable machine-readable kind, attached to outbound error events
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::NotAuthenticated => "not_authenticated",
            ChatError::Auth(_) => "auth_error",
            ChatError::Validation(_) => "validation_error",
            ChatError::RoomNotFound => "room_not_found",
            ChatError::MessageNotFound => "message_not_found",
            ChatError::UserNotFound => "user_not_found",
            ChatError::AccessDenied => "access_denied",
            ChatError::Upstream(_) => "upstream_failure",
        }
    }

    /// Message safe to hand to a client. Upstream details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Upstream(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Upstream(format!("database: {err}"))
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            ChatError::NotAuthenticated,
            ChatError::Auth("x".into()),
            ChatError::validation("x"),
            ChatError::RoomNotFound,
            ChatError::MessageNotFound,
            ChatError::UserNotFound,
            ChatError::AccessDenied,
            ChatError::Upstream("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_upstream_details_hidden_from_clients() {
        let err = ChatError::Upstream("connection refused on 10.0.0.3".into());
        assert_eq!(err.client_message(), "Internal server error");
        assert!(err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = ChatError::validation("Message content cannot be empty");
        assert_eq!(err.client_message(), "Message content cannot be empty");
    }
}

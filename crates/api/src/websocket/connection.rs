//! WebSocket connection management
//!
//! Represents one live session. A connection starts unauthenticated and is
//! bound to at most one identity.

use huddle_shared::{ChatError, ChatResult, UserSummary};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Identity bound by a successful `authenticate`
    identity: RwLock<Option<UserSummary>>,
}

impl Connection {
    /// Create a new, unauthenticated connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sender,
            identity: RwLock::new(None),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Bind an identity, returning whichever identity was bound before
    pub async fn bind(&self, user: UserSummary) -> Option<UserSummary> {
        let mut identity = self.identity.write().await;
        tracing::debug!(
            session_id = %self.session_id,
            user_id = %user.id,
            "Connection bound to identity"
        );
        identity.replace(user)
    }

    pub async fn identity(&self) -> Option<UserSummary> {
        self.identity.read().await.clone()
    }

    /// Identity of an authenticated connection, `NotAuthenticated` otherwise
    pub async fn require_identity(&self) -> ChatResult<UserSummary> {
        self.identity().await.ok_or(ChatError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::User;

    #[tokio::test]
    async fn test_connection_starts_unauthenticated() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);

        assert!(conn.identity().await.is_none());
        assert!(matches!(
            conn.require_identity().await,
            Err(ChatError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_bind_replaces_identity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        let alice = User::new("alice").summary();
        let bob = User::new("bob").summary();

        assert!(conn.bind(alice.clone()).await.is_none());
        assert_eq!(conn.bind(bob.clone()).await, Some(alice));
        assert_eq!(conn.require_identity().await.unwrap(), bob);
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        drop(rx);

        assert!(conn.send(ServerEvent::Pong).is_err());
    }
}

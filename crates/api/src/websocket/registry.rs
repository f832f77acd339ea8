//! Connection registry and presence
//!
//! Tracks every live connection and maps each online identity to its single
//! active connection. The most recent authentication wins.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_shared::{PresenceStatus, UserId, UserSummary};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::{OnlineUser, ServerEvent};

#[derive(Debug, Clone)]
struct OnlineEntry {
    session_id: Uuid,
    user: UserSummary,
}

#[derive(Default)]
struct RegistryInner {
    /// All active connections indexed by session_id
    connections: HashMap<Uuid, Arc<Connection>>,
    /// At most one entry per identity
    online: HashMap<UserId, OnlineEntry>,
}

/// Registry of live connections and online identities
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut inner = self.inner.write().await;
        inner.connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            total_connections = inner.connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection. Its identity entry, if any, is left for
    /// [`ConnectionRegistry::unregister_if`].
    pub async fn remove_connection(&self, session_id: &Uuid) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let removed = inner.connections.remove(session_id);
        if removed.is_some() {
            tracing::info!(
                session_id = %session_id,
                remaining_connections = inner.connections.len(),
                "WebSocket connection removed"
            );
        }
        removed
    }

    /// Point an identity at a connection, overwriting any earlier entry.
    /// Returns the session that was displaced, if it was a different one.
    pub async fn register(&self, user: UserSummary, session_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.write().await;
        let user_id = user.id;
        let previous = inner
            .online
            .insert(user_id, OnlineEntry { session_id, user })
            .map(|entry| entry.session_id)
            .filter(|previous| *previous != session_id);

        if let Some(previous) = previous {
            tracing::info!(
                user_id = %user_id,
                session_id = %session_id,
                replaced_session_id = %previous,
                "Identity re-authenticated on a new connection"
            );
        }

        previous
    }

    /// Remove the identity's entry only if it still refers to this session.
    /// Returns true if the entry was removed.
    pub async fn unregister_if(&self, user_id: &UserId, session_id: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        match inner.online.get(user_id) {
            Some(entry) if entry.session_id == *session_id => {
                inner.online.remove(user_id);
                true
            }
            Some(_) => {
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Stale connection closed, newer registry entry kept"
                );
                false
            }
            None => false,
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let inner = self.inner.read().await;
        inner.online.contains_key(user_id)
    }

    /// The identity's registered connection, if online
    pub async fn connection_for(&self, user_id: &UserId) -> Option<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .online
            .get(user_id)
            .and_then(|entry| inner.connections.get(&entry.session_id))
            .cloned()
    }

    /// Snapshot of everyone online, ordered by username
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        let inner = self.inner.read().await;
        let mut users: Vec<OnlineUser> = inner
            .online
            .values()
            .map(|entry| OnlineUser {
                user_id: entry.user.id,
                username: entry.user.username.clone(),
                avatar: entry.user.avatar.clone(),
                status: PresenceStatus::Online,
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username).then(a.user_id.cmp(&b.user_id)));
        users
    }

    /// Send an event to the identity's registered connection.
    /// Returns false if the identity is offline or the send failed.
    pub async fn send_to_user(&self, user_id: &UserId, event: ServerEvent) -> bool {
        match self.connection_for(user_id).await {
            Some(conn) => conn.send(event).is_ok(),
            None => false,
        }
    }

    /// Broadcast an event to every connection
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.broadcast_filtered(None, event).await
    }

    /// Broadcast an event to every connection but one
    pub async fn broadcast_except(&self, session_id: &Uuid, event: ServerEvent) -> usize {
        self.broadcast_filtered(Some(session_id), event).await
    }

    async fn broadcast_filtered(&self, skip: Option<&Uuid>, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in inner.connections.values() {
            if Some(&conn.session_id) == skip {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => failed_count += 1,
            }
        }

        tracing::debug!(
            event_type = event.name(),
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to all connections"
        );

        success_count
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.connections.len()
    }

    /// Get number of online identities
    pub async fn online_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.online.len()
    }
}

//! Room subscriptions for pub/sub
//!
//! Tracks which connections are subscribed to which room. A connection is
//! subscribed to at most one room; joining another room moves it.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_shared::RoomId;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Result of subscribing a connection to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection was already subscribed to this room
    AlreadySubscribed,
    /// Subscribed, after leaving `previous` if there was one
    Joined { previous: Option<RoomId> },
}

#[derive(Default)]
struct RoomsInner {
    /// room_id -> subscribed connections
    rooms: HashMap<RoomId, Vec<Arc<Connection>>>,
    /// session_id -> the one room it is subscribed to
    current: HashMap<Uuid, RoomId>,
}

impl RoomsInner {
    fn detach(&mut self, room_id: &RoomId, session_id: &Uuid) {
        if let Some(conns) = self.rooms.get_mut(room_id) {
            conns.retain(|c| c.session_id != *session_id);

            // Clean up empty rooms
            if conns.is_empty() {
                self.rooms.remove(room_id);
                tracing::debug!(room_id = %room_id, "Removed empty room");
            }
        }
    }
}

/// Manages room subscriptions for broadcasting events
#[derive(Default)]
pub struct RoomManager {
    inner: RwLock<RoomsInner>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room, unsubscribing it from any other room
    /// under the same lock
    pub async fn join(&self, room_id: RoomId, conn: Arc<Connection>) -> JoinOutcome {
        let mut inner = self.inner.write().await;
        let session_id = conn.session_id;

        let previous = inner.current.get(&session_id).copied();
        if previous == Some(room_id) {
            return JoinOutcome::AlreadySubscribed;
        }
        if let Some(previous) = previous {
            inner.detach(&previous, &session_id);
        }

        inner.current.insert(session_id, room_id);
        let conns = inner.rooms.entry(room_id).or_default();
        conns.push(conn);

        tracing::debug!(
            room_id = %room_id,
            session_id = %session_id,
            previous_room = ?previous,
            room_size = conns.len(),
            "Connection joined room"
        );

        JoinOutcome::Joined { previous }
    }

    /// Unsubscribe a connection from a room. Returns false if it was not subscribed there.
    pub async fn leave(&self, room_id: &RoomId, session_id: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        if inner.current.get(session_id) != Some(room_id) {
            return false;
        }
        inner.current.remove(session_id);
        inner.detach(room_id, session_id);

        tracing::debug!(
            room_id = %room_id,
            session_id = %session_id,
            "Connection left room"
        );
        true
    }

    /// Remove a connection from whatever room it is in
    pub async fn remove_connection(&self, session_id: &Uuid) -> Option<RoomId> {
        let mut inner = self.inner.write().await;
        let room_id = inner.current.remove(session_id)?;
        inner.detach(&room_id, session_id);

        tracing::debug!(
            session_id = %session_id,
            room_id = %room_id,
            "Removed connection from room"
        );
        Some(room_id)
    }

    /// The room a connection is currently subscribed to
    pub async fn current_room(&self, session_id: &Uuid) -> Option<RoomId> {
        let inner = self.inner.read().await;
        inner.current.get(session_id).copied()
    }

    /// Broadcast an event to all connections in a room
    ///
    /// Silently ignores send errors (closed connections will be cleaned up)
    pub async fn broadcast(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        self.broadcast_filtered(room_id, None, event).await
    }

    /// Broadcast an event to all connections in a room except one
    pub async fn broadcast_except(
        &self,
        room_id: &RoomId,
        session_id: &Uuid,
        event: ServerEvent,
    ) -> usize {
        self.broadcast_filtered(room_id, Some(session_id), event).await
    }

    async fn broadcast_filtered(
        &self,
        room_id: &RoomId,
        skip: Option<&Uuid>,
        event: ServerEvent,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(conns) = inner.rooms.get(room_id) else {
            tracing::debug!(
                room_id = %room_id,
                event_type = event.name(),
                "No subscribers in room"
            );
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in conns {
            if Some(&conn.session_id) == skip {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room_id = %room_id,
            event_type = event.name(),
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );

        success_count
    }

    /// Session IDs currently subscribed to a room
    pub async fn subscribers(&self, room_id: &RoomId) -> Vec<Uuid> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(|conns| conns.iter().map(|c| c.session_id).collect())
            .unwrap_or_default()
    }

    /// Get room size (number of connections) for a room
    pub async fn get_room_size(&self, room_id: &RoomId) -> usize {
        let inner = self.inner.read().await;
        inner.rooms.get(room_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of rooms with subscribers
    pub async fn get_room_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_room_join_and_leave() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (conn, _rx) = connection();

        // Initially room doesn't exist
        assert_eq!(room_manager.get_room_size(&room_id).await, 0);

        room_manager.join(room_id, Arc::clone(&conn)).await;
        assert_eq!(room_manager.get_room_size(&room_id).await, 1);

        assert!(room_manager.leave(&room_id, &conn.session_id).await);
        assert_eq!(room_manager.get_room_size(&room_id).await, 0);
        assert_eq!(room_manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (conn, _rx) = connection();

        assert_eq!(
            room_manager.join(room_id, Arc::clone(&conn)).await,
            JoinOutcome::Joined { previous: None }
        );
        assert_eq!(
            room_manager.join(room_id, Arc::clone(&conn)).await,
            JoinOutcome::AlreadySubscribed
        );
        assert_eq!(room_manager.subscribers(&room_id).await, vec![conn.session_id]);
    }

    #[tokio::test]
    async fn test_joining_moves_connection_between_rooms() {
        let room_manager = RoomManager::new();
        let first = RoomId::new();
        let second = RoomId::new();
        let (conn, _rx) = connection();

        room_manager.join(first, Arc::clone(&conn)).await;
        let outcome = room_manager.join(second, Arc::clone(&conn)).await;

        assert_eq!(outcome, JoinOutcome::Joined { previous: Some(first) });
        assert_eq!(room_manager.get_room_size(&first).await, 0);
        assert_eq!(room_manager.get_room_size(&second).await, 1);
        assert_eq!(room_manager.current_room(&conn.session_id).await, Some(second));
    }

    #[tokio::test]
    async fn test_leave_other_room_is_noop() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (conn, _rx) = connection();

        room_manager.join(room_id, Arc::clone(&conn)).await;
        assert!(!room_manager.leave(&RoomId::new(), &conn.session_id).await);
        assert_eq!(room_manager.current_room(&conn.session_id).await, Some(room_id));
    }

    #[tokio::test]
    async fn test_broadcast_to_room() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (conn1, mut rx1) = connection();
        let (conn2, mut rx2) = connection();
        let (outsider, mut rx3) = connection();

        room_manager.join(room_id, conn1).await;
        room_manager.join(room_id, conn2).await;
        room_manager.join(RoomId::new(), outsider).await;

        let delivered = room_manager.broadcast(&room_id, ServerEvent::Pong).await;

        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (sender, mut sender_rx) = connection();
        let (other, mut other_rx) = connection();

        room_manager.join(room_id, Arc::clone(&sender)).await;
        room_manager.join(room_id, other).await;

        room_manager
            .broadcast_except(&room_id, &sender.session_id, ServerEvent::Pong)
            .await;

        assert!(other_rx.try_recv().is_ok());
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_connection() {
        let room_manager = RoomManager::new();
        let room_id = RoomId::new();
        let (conn, _rx) = connection();

        room_manager.join(room_id, Arc::clone(&conn)).await;
        assert_eq!(
            room_manager.remove_connection(&conn.session_id).await,
            Some(room_id)
        );
        assert_eq!(room_manager.get_room_count().await, 0);
        assert_eq!(room_manager.remove_connection(&conn.session_id).await, None);
    }
}

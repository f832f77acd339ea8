//! Typing indicators
//!
//! Ephemeral, never persisted. Entries are cleared on explicit stop, on
//! moving to another room and on going offline.

use std::collections::HashSet;
use std::sync::Arc;

use huddle_shared::{ChatError, ChatResult, RoomId, UserId};
use tokio::sync::RwLock;

use super::ChatHub;
use crate::websocket::{connection::Connection, events::ServerEvent};

/// Who is currently typing in which room
#[derive(Default)]
pub struct TypingTracker {
    typing: RwLock<HashSet<(RoomId, UserId)>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the user was not already typing there
    pub async fn start(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.typing.write().await.insert((room_id, user_id))
    }

    /// Returns true if the user was typing there
    pub async fn stop(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.typing.write().await.remove(&(room_id, user_id))
    }

    /// Forget every room the user was typing in and return those rooms
    pub async fn clear_user(&self, user_id: &UserId) -> Vec<RoomId> {
        let mut typing = self.typing.write().await;
        let rooms: Vec<RoomId> = typing
            .iter()
            .filter(|(_, u)| u == user_id)
            .map(|(room_id, _)| *room_id)
            .collect();
        for room_id in &rooms {
            typing.remove(&(*room_id, *user_id));
        }
        rooms
    }

    pub async fn is_typing(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.typing.read().await.contains(&(room_id, user_id))
    }
}

impl ChatHub {
    /// Tell the room's other subscribers the user is typing. Repeated starts
    /// re-broadcast; clients debounce.
    pub async fn start_typing(&self, conn: &Arc<Connection>, room_id: RoomId) -> ChatResult<()> {
        let user = conn.require_identity().await?;
        self.ensure_subscribed(conn, room_id).await?;
        self.typing.start(room_id, user.id).await;

        self.rooms
            .broadcast_except(
                &room_id,
                &conn.session_id,
                ServerEvent::UserTyping {
                    user_id: user.id,
                    username: user.username,
                    room_id,
                },
            )
            .await;
        Ok(())
    }

    pub async fn stop_typing(&self, conn: &Arc<Connection>, room_id: RoomId) -> ChatResult<()> {
        let user = conn.require_identity().await?;
        self.ensure_subscribed(conn, room_id).await?;
        self.typing.stop(room_id, user.id).await;

        self.rooms
            .broadcast_except(
                &room_id,
                &conn.session_id,
                ServerEvent::UserStopTyping {
                    user_id: user.id,
                    username: user.username,
                    room_id,
                },
            )
            .await;
        Ok(())
    }

    /// Typing is only relayed for the room the connection has joined
    async fn ensure_subscribed(&self, conn: &Connection, room_id: RoomId) -> ChatResult<()> {
        if self.rooms.current_room(&conn.session_id).await != Some(room_id) {
            return Err(ChatError::AccessDenied);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let tracker = TypingTracker::new();
        let room = RoomId::new();
        let user = UserId::new();

        assert!(tracker.start(room, user).await);
        assert!(!tracker.start(room, user).await);
        assert!(tracker.is_typing(room, user).await);

        assert!(tracker.stop(room, user).await);
        assert!(!tracker.stop(room, user).await);
        assert!(!tracker.is_typing(room, user).await);
    }

    #[tokio::test]
    async fn test_clear_user_only_touches_that_user() {
        let tracker = TypingTracker::new();
        let (first, second) = (RoomId::new(), RoomId::new());
        let (alice, bob) = (UserId::new(), UserId::new());

        tracker.start(first, alice).await;
        tracker.start(second, alice).await;
        tracker.start(first, bob).await;

        let mut cleared = tracker.clear_user(&alice).await;
        cleared.sort();
        let mut expected = vec![first, second];
        expected.sort();

        assert_eq!(cleared, expected);
        assert!(!tracker.is_typing(first, alice).await);
        assert!(tracker.is_typing(first, bob).await);
        assert!(tracker.clear_user(&alice).await.is_empty());
    }
}

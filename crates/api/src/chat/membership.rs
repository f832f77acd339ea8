//! Room subscription, membership, and history

use std::sync::Arc;

use huddle_shared::{
    ChatError, ChatResult, MessagePage, MessageView, NewRoom, PageRequest, Pagination, Room,
    RoomId, UserId,
};

use super::ChatHub;
use crate::store;
use crate::websocket::{connection::Connection, events::ServerEvent, room::JoinOutcome};

impl ChatHub {
    /// Subscribe a connection to a room and hand it recent history.
    ///
    /// Public rooms admit anyone and record them as members on first view.
    /// Private rooms admit members only.
    pub async fn join_room(
        &self,
        conn: &Arc<Connection>,
        room_id: RoomId,
    ) -> ChatResult<Vec<MessageView>> {
        let user = conn.require_identity().await?;
        let room = self.visible_room(user.id, room_id).await?;

        // Store work first so a failure leaves no subscription behind
        if !room.is_member(&user.id) {
            self.store.add_member(room_id, user.id).await?;
        }
        let messages = self.recent_history(room_id).await?;

        let outcome = self.rooms.join(room_id, Arc::clone(conn)).await;
        if let JoinOutcome::Joined {
            previous: Some(previous),
        } = outcome
        {
            if self.typing.stop(previous, user.id).await {
                self.rooms
                    .broadcast(
                        &previous,
                        ServerEvent::UserStopTyping {
                            user_id: user.id,
                            username: user.username.clone(),
                            room_id: previous,
                        },
                    )
                    .await;
            }
        }

        let _ = conn.send(ServerEvent::RoomMessages {
            room_id,
            messages: messages.clone(),
        });

        if outcome != JoinOutcome::AlreadySubscribed {
            self.rooms
                .broadcast_except(
                    &room_id,
                    &conn.session_id,
                    ServerEvent::UserJoinedRoom {
                        user_id: user.id,
                        username: user.username.clone(),
                        room_id,
                    },
                )
                .await;
        }

        tracing::debug!(
            session_id = %conn.session_id,
            user_id = %user.id,
            room_id = %room_id,
            history = messages.len(),
            "Joined room"
        );

        Ok(messages)
    }

    /// Drop room membership. The connection is unsubscribed too if it is
    /// currently in that room.
    pub async fn leave_room(&self, conn: &Arc<Connection>, room_id: RoomId) -> ChatResult<()> {
        let user = conn.require_identity().await?;
        self.leave_membership(user.id, room_id).await?;

        if self.rooms.leave(&room_id, &conn.session_id).await {
            self.typing.stop(room_id, user.id).await;
        }
        let _ = conn.send(ServerEvent::RoomLeft { room_id });
        Ok(())
    }

    /// Most recent messages, chronological
    async fn recent_history(&self, room_id: RoomId) -> ChatResult<Vec<MessageView>> {
        let page = PageRequest::new(1, self.settings.history_limit);
        let (mut messages, _) = self.store.room_messages(room_id, page).await?;
        messages.reverse();
        self.enrich(messages).await
    }

    /// Load a room the user is allowed to see
    pub(super) async fn visible_room(&self, user_id: UserId, room_id: RoomId) -> ChatResult<Room> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        if !room.can_view(&user_id) {
            return Err(ChatError::AccessDenied);
        }
        Ok(room)
    }

    // =========================================================================
    // Request/response surface
    // =========================================================================

    pub async fn list_rooms(&self, user_id: UserId) -> ChatResult<Vec<Room>> {
        self.store.rooms_for_user(user_id).await
    }

    pub async fn create_room(&self, mut room: NewRoom, creator_id: UserId) -> ChatResult<Room> {
        room.name = room.name.trim().to_string();
        if room.name.is_empty() {
            return Err(ChatError::validation("Room name is required"));
        }
        room.creator_id = creator_id;

        let room = self.store.create_room(room).await?;
        tracing::info!(room_id = %room.id, creator_id = %creator_id, "Room created");
        Ok(room)
    }

    pub async fn room_details(&self, user_id: UserId, room_id: RoomId) -> ChatResult<Room> {
        self.visible_room(user_id, room_id).await
    }

    /// Explicit membership join; unlike viewing, an existing member is an error
    pub async fn join_membership(&self, user_id: UserId, room_id: RoomId) -> ChatResult<()> {
        self.visible_room(user_id, room_id).await?;
        if !self.store.add_member(room_id, user_id).await? {
            return Err(ChatError::validation("Already a member"));
        }
        Ok(())
    }

    /// Removes membership regardless of subscription state
    pub async fn leave_membership(&self, user_id: UserId, room_id: RoomId) -> ChatResult<()> {
        let removed = self.store.remove_member(room_id, user_id).await?;
        tracing::debug!(user_id = %user_id, room_id = %room_id, removed, "Left room");
        Ok(())
    }

    /// A page of room history, chronological within the page
    pub async fn room_history(
        &self,
        user_id: UserId,
        room_id: RoomId,
        page: PageRequest,
    ) -> ChatResult<MessagePage> {
        self.visible_room(user_id, room_id).await?;
        let page = page.normalized();
        let (mut messages, total) = self.store.room_messages(room_id, page).await?;
        messages.reverse();

        Ok(MessagePage {
            messages: self.enrich(messages).await?,
            pagination: Pagination::new(page, total),
        })
    }

    /// A page of the private conversation with another user
    pub async fn private_history(
        &self,
        user_id: UserId,
        other_id: UserId,
        page: PageRequest,
    ) -> ChatResult<MessagePage> {
        let page = page.normalized();
        let (mut messages, total) = self.store.private_messages(user_id, other_id, page).await?;
        messages.reverse();

        Ok(MessagePage {
            messages: self.enrich(messages).await?,
            pagination: Pagination::new(page, total),
        })
    }

    /// Substring search over messages the user can see, newest first
    pub async fn search(
        &self,
        user_id: UserId,
        query: &str,
        room_id: Option<RoomId>,
    ) -> ChatResult<Vec<MessageView>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::validation("Search query is required"));
        }
        if let Some(room_id) = room_id {
            self.visible_room(user_id, room_id).await?;
        }

        let found = self
            .store
            .search_messages(query, room_id, store::SEARCH_LIMIT)
            .await?;

        let mut visible = Vec::with_capacity(found.len());
        for message in found {
            match self.ensure_can_see(user_id, &message).await {
                Ok(()) => visible.push(message),
                Err(ChatError::AccessDenied | ChatError::RoomNotFound) => {}
                Err(e) => return Err(e),
            }
        }

        self.enrich(visible).await
    }
}

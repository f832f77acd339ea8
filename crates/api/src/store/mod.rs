//! Persistence collaborator
//!
//! The chat core never touches storage directly; it goes through [`ChatStore`].
//! Two backends are provided:
//! - **MemoryStore**: single-process store used for development and tests
//! - **PgStore**: Postgres via sqlx
//!
//! Paged reads return messages newest-first together with the total count so
//! callers can reverse them into chronological order for display.

use std::collections::HashMap;

use async_trait::async_trait;
use huddle_shared::{
    ChatResult, Message, MessageId, MessageView, NewMessage, NewRoom, PageRequest,
    PresenceStatus, ReactionKind, Room, RoomId, User, UserId,
};
use time::OffsetDateTime;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Upper bound on search results
pub const SEARCH_LIMIT: u32 = 100;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert or update a user's public profile
    async fn upsert_user(&self, user: &User) -> ChatResult<()>;

    async fn find_user(&self, id: UserId) -> ChatResult<Option<User>>;

    async fn find_users(&self, ids: &[UserId]) -> ChatResult<Vec<User>>;

    async fn set_presence(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: OffsetDateTime,
    ) -> ChatResult<()>;

    async fn find_room(&self, id: RoomId) -> ChatResult<Option<Room>>;

    /// Create a room with its creator as the first member
    async fn create_room(&self, room: NewRoom) -> ChatResult<Room>;

    /// Public rooms plus private rooms the user belongs to, latest activity first
    async fn rooms_for_user(&self, user_id: UserId) -> ChatResult<Vec<Room>>;

    /// Returns false if the user was already a member
    async fn add_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool>;

    /// Returns false if the user was not a member
    async fn remove_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool>;

    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message>;

    /// Point the room at its newest message
    async fn touch_room(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: OffsetDateTime,
    ) -> ChatResult<()>;

    /// Newest-first page of a room's history plus the room's total message count
    async fn room_messages(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)>;

    /// Newest-first page of the private conversation between two users
    async fn private_messages(
        &self,
        a: UserId,
        b: UserId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)>;

    /// Case-insensitive substring search, newest first
    async fn search_messages(
        &self,
        query: &str,
        room_id: Option<RoomId>,
        limit: u32,
    ) -> ChatResult<Vec<Message>>;

    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Message>>;

    /// Atomically toggle a (user, kind) reaction and return the updated message.
    /// `None` if the message does not exist.
    async fn toggle_reaction(
        &self,
        id: MessageId,
        user_id: UserId,
        kind: ReactionKind,
    ) -> ChatResult<Option<Message>>;

    /// Add a reader to the read-by set. Returns false if the message does not exist.
    async fn mark_read(&self, id: MessageId, user_id: UserId) -> ChatResult<bool>;

    /// Replace content verbatim and flag the message as edited
    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        at: OffsetDateTime,
    ) -> ChatResult<Option<Message>>;

    /// Returns false if the message did not exist
    async fn delete_message(&self, id: MessageId) -> ChatResult<bool>;
}

/// Attach author projections to a batch of messages
pub async fn with_senders(
    store: &dyn ChatStore,
    messages: Vec<Message>,
) -> ChatResult<Vec<MessageView>> {
    let mut ids: Vec<UserId> = messages.iter().map(|m| m.sender_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let senders: HashMap<UserId, User> = store
        .find_users(&ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(messages
        .into_iter()
        .map(|m| {
            let sender = senders.get(&m.sender_id).map(User::summary);
            MessageView::new(m, sender)
        })
        .collect())
}

//! In-process chat store
//!
//! Every operation runs under a single lock, so read-modify-write operations
//! such as reaction toggles are atomic with respect to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use huddle_shared::{
    ChatError, ChatResult, Message, MessageId, MessageKind, MessageTarget, NewMessage, NewRoom,
    PageRequest, PresenceStatus, ReactionKind, Room, RoomId, User, UserId,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::ChatStore;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    /// Chronological, insertion order
    messages: Vec<Message>,
}

impl Inner {
    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest-first slice of an already chronological list
fn newest_first_page(chronological: Vec<&Message>, page: PageRequest) -> (Vec<Message>, u64) {
    let total = chronological.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let messages = chronological
        .into_iter()
        .rev()
        .skip(offset)
        .take(page.limit as usize)
        .cloned()
        .collect();
    (messages, total)
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn upsert_user(&self, user: &User) -> ChatResult<()> {
        let mut inner = self.inner.write().await;
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> ChatResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> ChatResult<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.users.get(id).cloned()).collect())
    }

    async fn set_presence(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: OffsetDateTime,
    ) -> ChatResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(ChatError::UserNotFound)?;
        user.status = status;
        user.last_seen = Some(at);
        Ok(())
    }

    async fn find_room(&self, id: RoomId) -> ChatResult<Option<Room>> {
        let inner = self.inner.read().await;
        Ok(inner.rooms.get(&id).cloned())
    }

    async fn create_room(&self, room: NewRoom) -> ChatResult<Room> {
        let now = OffsetDateTime::now_utc();
        let room = Room {
            id: RoomId::new(),
            name: room.name,
            description: room.description,
            is_private: room.is_private,
            creator_id: room.creator_id,
            members: vec![room.creator_id],
            last_activity: now,
            last_message_id: None,
            created_at: now,
        };

        let mut inner = self.inner.write().await;
        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn rooms_for_user(&self, user_id: UserId) -> ChatResult<Vec<Room>> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<Room> = inner
            .rooms
            .values()
            .filter(|r| r.can_view(&user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rooms)
    }

    async fn add_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool> {
        let mut inner = self.inner.write().await;
        let room = inner.rooms.get_mut(&room_id).ok_or(ChatError::RoomNotFound)?;
        if room.is_member(&user_id) {
            return Ok(false);
        }
        room.members.push(user_id);
        Ok(true)
    }

    async fn remove_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool> {
        let mut inner = self.inner.write().await;
        let room = inner.rooms.get_mut(&room_id).ok_or(ChatError::RoomNotFound)?;
        let before = room.members.len();
        room.members.retain(|m| *m != user_id);
        Ok(room.members.len() < before)
    }

    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message> {
        let message = message.into_message(OffsetDateTime::now_utc());
        let mut inner = self.inner.write().await;
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn touch_room(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: OffsetDateTime,
    ) -> ChatResult<()> {
        let mut inner = self.inner.write().await;
        let room = inner.rooms.get_mut(&room_id).ok_or(ChatError::RoomNotFound)?;
        room.last_activity = at;
        room.last_message_id = Some(message_id);
        Ok(())
    }

    async fn room_messages(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)> {
        let inner = self.inner.read().await;
        let in_room = inner
            .messages
            .iter()
            .filter(|m| m.room_id() == Some(room_id))
            .collect();
        Ok(newest_first_page(in_room, page))
    }

    async fn private_messages(
        &self,
        a: UserId,
        b: UserId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)> {
        let inner = self.inner.read().await;
        let conversation = inner
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Private)
            .filter(|m| match m.target {
                MessageTarget::Direct { recipient_id } => {
                    (m.sender_id == a && recipient_id == b)
                        || (m.sender_id == b && recipient_id == a)
                }
                MessageTarget::Room { .. } => false,
            })
            .collect();
        Ok(newest_first_page(conversation, page))
    }

    async fn search_messages(
        &self,
        query: &str,
        room_id: Option<RoomId>,
        limit: u32,
    ) -> ChatResult<Vec<Message>> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .rev()
            .filter(|m| room_id.map_or(true, |r| m.room_id() == Some(r)))
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn toggle_reaction(
        &self,
        id: MessageId,
        user_id: UserId,
        kind: ReactionKind,
    ) -> ChatResult<Option<Message>> {
        let mut inner = self.inner.write().await;
        Ok(inner.message_mut(id).map(|message| {
            message.toggle_reaction(user_id, kind);
            message.clone()
        }))
    }

    async fn mark_read(&self, id: MessageId, user_id: UserId) -> ChatResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.message_mut(id) {
            Some(message) => {
                message.mark_read_by(user_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        at: OffsetDateTime,
    ) -> ChatResult<Option<Message>> {
        let mut inner = self.inner.write().await;
        Ok(inner.message_mut(id).map(|message| {
            message.content = content.to_string();
            message.edited = true;
            message.edited_at = Some(at);
            message.clone()
        }))
    }

    async fn delete_message(&self, id: MessageId) -> ChatResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.id != id);
        Ok(inner.messages.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seeded() -> (MemoryStore, User, Room) {
        let store = MemoryStore::new();
        let user = User::new("alice");
        store.upsert_user(&user).await.unwrap();
        let room = store
            .create_room(NewRoom {
                name: "general".into(),
                description: None,
                is_private: false,
                creator_id: user.id,
            })
            .await
            .unwrap();
        (store, user, room)
    }

    fn text(sender: UserId, room_id: RoomId, content: &str) -> NewMessage {
        NewMessage {
            sender_id: sender,
            target: MessageTarget::Room { room_id },
            kind: MessageKind::Text,
            content: content.to_string(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_room_messages_newest_first_with_total() {
        let (store, user, room) = seeded().await;
        for i in 0..5 {
            store
                .insert_message(text(user.id, room.id, &format!("m{i}")))
                .await
                .unwrap();
        }

        let (page, total) = store
            .room_messages(room.id, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3"]);

        let (last, _) = store
            .room_messages(room.id, PageRequest::new(3, 2))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content, "m0");
    }

    #[tokio::test]
    async fn test_creator_is_first_member() {
        let (store, user, room) = seeded().await;
        assert_eq!(room.members, vec![user.id]);
        assert!(!store.add_member(room.id, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_membership_on_missing_room() {
        let store = MemoryStore::new();
        let result = store.add_member(RoomId::new(), UserId::new()).await;
        assert!(matches!(result, Err(ChatError::RoomNotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_are_not_lost() {
        let (store, user, room) = seeded().await;
        let store = Arc::new(store);
        let message = store
            .insert_message(text(user.id, room.id, "react to me"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            let reactor = UserId::new();
            handles.push(tokio::spawn(async move {
                store
                    .toggle_reaction(message.id, reactor, ReactionKind::Like)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.find_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.reactions.len(), 20);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_room_scoped() {
        let (store, user, room) = seeded().await;
        let other_room = RoomId::new();
        store
            .insert_message(text(user.id, room.id, "Hello World"))
            .await
            .unwrap();
        store
            .insert_message(text(user.id, other_room, "hello there"))
            .await
            .unwrap();

        let all = store.search_messages("HELLO", None, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hello there");

        let scoped = store
            .search_messages("hello", Some(room.id), 100)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].content, "Hello World");
    }

    #[tokio::test]
    async fn test_private_messages_cover_both_directions() {
        let store = MemoryStore::new();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        for (from, to) in [(a, b), (b, a), (a, c)] {
            store
                .insert_message(NewMessage {
                    sender_id: from,
                    target: MessageTarget::Direct { recipient_id: to },
                    kind: MessageKind::Private,
                    content: "psst".into(),
                    attachment: None,
                })
                .await
                .unwrap();
        }

        let (messages, total) = store
            .private_messages(b, a, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(messages.len(), 2);
    }
}

//! Common types used across Huddle

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Room ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RoomId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl FromStr for PresenceStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(ChatError::validation(format!("Unknown presence status: {other}"))),
        }
    }
}

/// Authenticated identity. Credentials never live on this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_seen: Option<OffsetDateTime>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            avatar: None,
            status: PresenceStatus::Offline,
            last_seen: None,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Public author projection attached to outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// =============================================================================
// Rooms
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_private: bool,
    pub creator_id: UserId,
    pub members: Vec<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<MessageId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Room {
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains(user_id)
    }

    /// Public rooms are open to everyone, private rooms only to members
    pub fn can_view(&self, user_id: &UserId) -> bool {
        !self.is_private || self.is_member(user_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(skip)]
    pub creator_id: UserId,
}

// =============================================================================
// Messages
// =============================================================================

/// Where a message is addressed. Exactly one of room or recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTarget {
    Room {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    Direct {
        #[serde(rename = "recipientId")]
        recipient_id: UserId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
    Private,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::Image => "image",
            MessageKind::Private => "private",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "file" => Ok(MessageKind::File),
            "image" => Ok(MessageKind::Image),
            "private" => Ok(MessageKind::Private),
            other => Err(ChatError::validation(format!("Unknown message type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Angry,
    Sad,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Love => "love",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Angry => "angry",
            ReactionKind::Sad => "sad",
        }
    }
}

impl FromStr for ReactionKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionKind::Like),
            "love" => Ok(ReactionKind::Love),
            "laugh" => Ok(ReactionKind::Laugh),
            "angry" => Ok(ReactionKind::Angry),
            "sad" => Ok(ReactionKind::Sad),
            other => Err(ChatError::validation(format!("Unknown reaction type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileType")]
    pub mime_type: String,
    #[serde(rename = "fileSize")]
    pub size: u64,
    #[serde(rename = "fileUrl")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(flatten)]
    pub target: MessageTarget,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none", default)]
    pub attachment: Option<Attachment>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<UserId>,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn room_id(&self) -> Option<RoomId> {
        match self.target {
            MessageTarget::Room { room_id } => Some(room_id),
            MessageTarget::Direct { .. } => None,
        }
    }

    pub fn recipient_id(&self) -> Option<UserId> {
        match self.target {
            MessageTarget::Room { .. } => None,
            MessageTarget::Direct { recipient_id } => Some(recipient_id),
        }
    }

    pub fn has_reaction(&self, user_id: UserId, kind: ReactionKind) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.kind == kind)
    }

    /// Remove the (user, kind) reaction if present, add it otherwise.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(&mut self, user_id: UserId, kind: ReactionKind) -> bool {
        if self.has_reaction(user_id, kind) {
            self.reactions
                .retain(|r| !(r.user_id == user_id && r.kind == kind));
            false
        } else {
            self.reactions.push(Reaction { user_id, kind });
            true
        }
    }

    /// Add a reader to the read-by set. Returns false if already present.
    pub fn mark_read_by(&mut self, user_id: UserId) -> bool {
        if self.read_by.contains(&user_id) {
            return false;
        }
        self.read_by.push(user_id);
        true
    }
}

/// A message ready to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub target: MessageTarget,
    pub kind: MessageKind,
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn into_message(self, created_at: OffsetDateTime) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: self.sender_id,
            target: self.target,
            kind: self.kind,
            content: self.content,
            attachment: self.attachment,
            reactions: Vec::new(),
            read_by: Vec::new(),
            edited: false,
            edited_at: None,
            created_at,
        }
    }
}

/// Message enriched with its author's public projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: UserSummary,
}

impl MessageView {
    /// Falls back to a placeholder author for users that no longer exist
    pub fn new(message: Message, sender: Option<UserSummary>) -> Self {
        let sender = sender.unwrap_or_else(|| UserSummary {
            id: message.sender_id,
            username: "Unknown".to_string(),
            avatar: None,
        });
        Self { message, sender }
    }
}

// =============================================================================
// Pagination
// =============================================================================

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request, newest page first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Re-applies bounds to a request that came straight from a query string
    pub fn normalized(self) -> Self {
        Self::new(self.page, self.limit)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_messages: u64,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let limit = u64::from(request.limit);
        let total_pages = total.div_ceil(limit);
        Self {
            current_page: request.page,
            total_pages,
            total_messages: total,
            has_next: u64::from(request.page) * limit < total,
        }
    }
}

/// One page of history in chronological order
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_message() -> Message {
        NewMessage {
            sender_id: UserId::new(),
            target: MessageTarget::Room {
                room_id: RoomId::new(),
            },
            kind: MessageKind::Text,
            content: "hi".to_string(),
            attachment: None,
        }
        .into_message(OffsetDateTime::now_utc())
    }

    #[test]
    fn test_toggle_reaction_round_trip() {
        let mut message = room_message();
        let other = UserId::new();
        message.toggle_reaction(other, ReactionKind::Love);
        let before = message.reactions.clone();

        let user = UserId::new();
        assert!(message.toggle_reaction(user, ReactionKind::Like));
        assert!(message.has_reaction(user, ReactionKind::Like));
        assert!(!message.toggle_reaction(user, ReactionKind::Like));
        assert_eq!(message.reactions, before);
    }

    #[test]
    fn test_reactions_unique_per_user_and_kind() {
        let mut message = room_message();
        let user = UserId::new();
        message.toggle_reaction(user, ReactionKind::Like);
        message.toggle_reaction(user, ReactionKind::Sad);
        assert_eq!(message.reactions.len(), 2);
    }

    #[test]
    fn test_mark_read_is_a_set() {
        let mut message = room_message();
        let user = UserId::new();
        assert!(message.mark_read_by(user));
        assert!(!message.mark_read_by(user));
        assert_eq!(message.read_by, vec![user]);
    }

    #[test]
    fn test_message_serializes_exactly_one_target() {
        let message = room_message();
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("roomId").is_some());
        assert!(json.get("recipientId").is_none());
        assert_eq!(json["messageType"], "text");
    }

    #[test]
    fn test_unknown_reaction_kind_rejected() {
        assert!("like".parse::<ReactionKind>().is_ok());
        assert!(matches!(
            "thumbsdown".parse::<ReactionKind>(),
            Err(ChatError::Validation(_))
        ));
        assert!(serde_json::from_str::<ReactionKind>(r#""thumbsdown""#).is_err());
    }

    #[test]
    fn test_page_request_bounds() {
        let request = PageRequest::new(0, 1000);
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_pagination_partial_page() {
        let pagination = Pagination::new(PageRequest::new(3, 10), 23);
        assert_eq!(pagination.total_pages, 3);
        assert!(!pagination.has_next);

        let pagination = Pagination::new(PageRequest::new(1, 10), 23);
        assert!(pagination.has_next);
    }

    #[test]
    fn test_pagination_empty_history() {
        let pagination = Pagination::new(PageRequest::default(), 0);
        assert_eq!(pagination.total_pages, 0);
        assert!(!pagination.has_next);
    }
}

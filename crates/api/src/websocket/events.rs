//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Event names are snake_case,
//! payload fields camelCase.

use huddle_shared::{
    MessageId, MessageKind, MessageView, PresenceStatus, Reaction, RoomId, User, UserId,
    UserSummary,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to an identity
    Authenticate { token: String },

    /// Subscribe to a room, leaving any other room first
    JoinRoom { room_id: RoomId },

    /// Drop room membership
    LeaveRoom { room_id: RoomId },

    SendMessage {
        #[serde(default)]
        content: String,
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        message_type: MessageKind,
    },

    SendPrivateMessage {
        #[serde(default)]
        content: String,
        #[serde(default)]
        recipient_id: Option<UserId>,
    },

    TypingStart { room_id: RoomId },

    TypingStop { room_id: RoomId },

    /// Toggle a reaction. The kind is validated by the hub.
    AddReaction { message_id: MessageId, reaction: String },

    UploadFile {
        /// Base64, optionally as a `data:` URL
        file_data: String,
        file_name: String,
        file_type: String,
        room_id: RoomId,
    },

    MarkAsRead { message_id: MessageId },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    Authenticated { user: User },

    AuthenticationError { message: String },

    /// Full online snapshot
    OnlineUsers { users: Vec<OnlineUser> },

    UserOnline {
        user_id: UserId,
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },

    UserOffline { user_id: UserId },

    /// Recent history in chronological order, sent on join
    RoomMessages {
        room_id: RoomId,
        messages: Vec<MessageView>,
    },

    UserJoinedRoom {
        user_id: UserId,
        username: String,
        room_id: RoomId,
    },

    RoomLeft { room_id: RoomId },

    NewMessage { message: MessageView },

    UserTyping {
        user_id: UserId,
        username: String,
        room_id: RoomId,
    },

    UserStopTyping {
        user_id: UserId,
        username: String,
        room_id: RoomId,
    },

    PrivateMessage { message: MessageView },

    PrivateMessageSent { message: MessageView },

    /// Full reaction set after a toggle
    MessageReaction {
        message_id: MessageId,
        reactions: Vec<Reaction>,
    },

    MessageRead {
        message_id: MessageId,
        reader_id: UserId,
    },

    MessageEdited { message: MessageView },

    MessageDeleted {
        message_id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },

    /// Heartbeat response
    Pong,

    /// Error message with a stable machine-readable code
    Error { message: String, code: String },
}

impl ServerEvent {
    pub fn user_online(user: &UserSummary) -> Self {
        ServerEvent::UserOnline {
            user_id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }

    pub fn error(err: &huddle_shared::ChatError) -> Self {
        ServerEvent::Error {
            message: err.client_message(),
            code: err.code().to_string(),
        }
    }

    /// Event name on the wire, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::AuthenticationError { .. } => "authentication_error",
            ServerEvent::OnlineUsers { .. } => "online_users",
            ServerEvent::UserOnline { .. } => "user_online",
            ServerEvent::UserOffline { .. } => "user_offline",
            ServerEvent::RoomMessages { .. } => "room_messages",
            ServerEvent::UserJoinedRoom { .. } => "user_joined_room",
            ServerEvent::RoomLeft { .. } => "room_left",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
            ServerEvent::PrivateMessage { .. } => "private_message",
            ServerEvent::PrivateMessageSent { .. } => "private_message_sent",
            ServerEvent::MessageReaction { .. } => "message_reaction",
            ServerEvent::MessageRead { .. } => "message_read",
            ServerEvent::MessageEdited { .. } => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// Entry in the online snapshot
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: PresenceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"join_room","roomId":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinRoom { room_id } => {
                assert_eq!(room_id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
            }
            _ => panic!("Expected JoinRoom event"),
        }
    }

    #[test]
    fn test_send_message_defaults() {
        let json = r#"{"type":"send_message","content":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage {
                content,
                room_id,
                message_type,
            } => {
                assert_eq!(content, "hi");
                assert!(room_id.is_none());
                assert_eq!(message_type, MessageKind::Text);
            }
            _ => panic!("Expected SendMessage event"),
        }
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Pong;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_user_offline_uses_camel_case_fields() {
        let user_id = UserId::new();
        let json = serde_json::to_value(ServerEvent::UserOffline { user_id }).unwrap();
        assert_eq!(json["type"], "user_offline");
        assert_eq!(json["userId"], user_id.to_string());
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = ServerEvent::error(&huddle_shared::ChatError::RoomNotFound);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Room not found");
        assert_eq!(json["code"], "room_not_found");
    }

    #[test]
    fn test_event_name_matches_wire_tag() {
        let event = ServerEvent::RoomLeft {
            room_id: RoomId::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }
}

//! Message pipeline: validate, persist, enrich, fan out, notify

use std::sync::Arc;

use huddle_shared::{
    Attachment, ChatError, ChatResult, MessageId, MessageKind, MessageTarget, MessageView,
    NewMessage, Room, RoomId, UserId, UserSummary,
};
use time::OffsetDateTime;

use super::ChatHub;
use crate::websocket::{connection::Connection, events::ServerEvent};

/// A room message as submitted by a client
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub content: String,
    pub room_id: Option<RoomId>,
    pub kind: MessageKind,
}

impl OutgoingMessage {
    pub fn text(room_id: RoomId, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            room_id: Some(room_id),
            kind: MessageKind::Text,
        }
    }
}

/// Decoded file bytes bound for a room
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub room_id: RoomId,
}

impl ChatHub {
    /// Persist a room message and echo it to every subscriber, sender included
    pub async fn send_message(
        &self,
        conn: &Arc<Connection>,
        outgoing: OutgoingMessage,
    ) -> ChatResult<MessageView> {
        let user = conn.require_identity().await?;

        if outgoing.content.trim().is_empty() {
            return Err(ChatError::validation("Message content is required"));
        }
        let room_id = outgoing
            .room_id
            .ok_or_else(|| ChatError::validation("Room is required"))?;
        if matches!(outgoing.kind, MessageKind::Private | MessageKind::File) {
            return Err(ChatError::validation(format!(
                "Message type {} cannot be sent to a room",
                outgoing.kind.as_str()
            )));
        }

        let room = self.visible_room(user.id, room_id).await?;
        let message = NewMessage {
            sender_id: user.id,
            target: MessageTarget::Room { room_id },
            kind: outgoing.kind,
            content: outgoing.content,
            attachment: None,
        };

        self.publish_to_room(&user, &room, message).await
    }

    /// Persist a private message and deliver it to the recipient if online.
    /// The sender always gets a confirmation.
    pub async fn send_private_message(
        &self,
        conn: &Arc<Connection>,
        content: String,
        recipient_id: Option<UserId>,
    ) -> ChatResult<MessageView> {
        let user = conn.require_identity().await?;

        if content.trim().is_empty() {
            return Err(ChatError::validation("Message content is required"));
        }
        let recipient_id =
            recipient_id.ok_or_else(|| ChatError::validation("Recipient is required"))?;
        if self.store.find_user(recipient_id).await?.is_none() {
            return Err(ChatError::UserNotFound);
        }

        let message = self
            .store
            .insert_message(NewMessage {
                sender_id: user.id,
                target: MessageTarget::Direct { recipient_id },
                kind: MessageKind::Private,
                content,
                attachment: None,
            })
            .await?;
        let view = self.enrich_one(message).await?;

        let delivered = self
            .registry
            .send_to_user(
                &recipient_id,
                ServerEvent::PrivateMessage {
                    message: view.clone(),
                },
            )
            .await;
        let _ = conn.send(ServerEvent::PrivateMessageSent {
            message: view.clone(),
        });

        tracing::debug!(
            message_id = %view.message.id,
            sender_id = %user.id,
            recipient_id = %recipient_id,
            delivered,
            "Private message sent"
        );

        if !self.registry.is_online(&recipient_id).await {
            self.notify_best_effort(
                recipient_id,
                format!("Private message from {}", user.username),
                view.message.content.clone(),
            );
        }

        Ok(view)
    }

    /// Store the bytes, then post a file message to the room.
    /// A storage failure means no message is created.
    pub async fn upload_file(
        &self,
        conn: &Arc<Connection>,
        upload: FileUpload,
    ) -> ChatResult<MessageView> {
        let user = conn.require_identity().await?;

        if upload.file_name.trim().is_empty() {
            return Err(ChatError::validation("File name is required"));
        }
        if upload.bytes.is_empty() {
            return Err(ChatError::validation("File is empty"));
        }
        if upload.bytes.len() > self.settings.max_upload_bytes {
            return Err(ChatError::validation(format!(
                "File exceeds the {} byte limit",
                self.settings.max_upload_bytes
            )));
        }

        let room = self.visible_room(user.id, upload.room_id).await?;
        let url = self
            .blobs
            .put(&upload.file_name, &upload.mime_type, &upload.bytes)
            .await?;

        let message = NewMessage {
            sender_id: user.id,
            target: MessageTarget::Room {
                room_id: upload.room_id,
            },
            kind: MessageKind::File,
            content: upload.file_name.clone(),
            attachment: Some(Attachment {
                file_name: upload.file_name,
                mime_type: upload.mime_type,
                size: upload.bytes.len() as u64,
                url,
            }),
        };

        self.publish_to_room(&user, &room, message).await
    }

    /// Record a read receipt and acknowledge it to the reader
    pub async fn mark_as_read(
        &self,
        conn: &Arc<Connection>,
        message_id: MessageId,
    ) -> ChatResult<()> {
        let user = conn.require_identity().await?;

        if !self.store.mark_read(message_id, user.id).await? {
            return Err(ChatError::MessageNotFound);
        }

        let _ = conn.send(ServerEvent::MessageRead {
            message_id,
            reader_id: user.id,
        });
        Ok(())
    }

    /// Replace a message's content. Only the author may edit.
    pub async fn edit_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
        content: String,
    ) -> ChatResult<MessageView> {
        if content.trim().is_empty() {
            return Err(ChatError::validation("Message content is required"));
        }
        let existing = self
            .store
            .find_message(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound)?;
        if existing.sender_id != user_id {
            return Err(ChatError::AccessDenied);
        }

        let updated = self
            .store
            .update_content(message_id, &content, OffsetDateTime::now_utc())
            .await?
            .ok_or(ChatError::MessageNotFound)?;
        let view = self.enrich_one(updated).await?;

        self.fan_out_to_audience(
            &view.message,
            ServerEvent::MessageEdited {
                message: view.clone(),
            },
        )
        .await;

        tracing::debug!(message_id = %message_id, user_id = %user_id, "Message edited");
        Ok(view)
    }

    /// Remove a message. Only the author may delete.
    pub async fn delete_message(&self, user_id: UserId, message_id: MessageId) -> ChatResult<()> {
        let existing = self
            .store
            .find_message(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound)?;
        if existing.sender_id != user_id {
            return Err(ChatError::AccessDenied);
        }

        if !self.store.delete_message(message_id).await? {
            return Err(ChatError::MessageNotFound);
        }

        self.fan_out_to_audience(
            &existing,
            ServerEvent::MessageDeleted {
                message_id,
                room_id: existing.room_id(),
            },
        )
        .await;

        tracing::debug!(message_id = %message_id, user_id = %user_id, "Message deleted");
        Ok(())
    }

    /// Shared tail of room and file messages
    async fn publish_to_room(
        &self,
        sender: &UserSummary,
        room: &Room,
        message: NewMessage,
    ) -> ChatResult<MessageView> {
        let message = self.store.insert_message(message).await?;
        self.store
            .touch_room(room.id, message.id, message.created_at)
            .await?;

        let view = self.enrich_one(message).await?;
        let recipients = self
            .rooms
            .broadcast(
                &room.id,
                ServerEvent::NewMessage {
                    message: view.clone(),
                },
            )
            .await;

        tracing::debug!(
            message_id = %view.message.id,
            room_id = %room.id,
            sender_id = %sender.id,
            recipients,
            "Message published"
        );

        let title = format!("New message from {}", sender.username);
        for member in room.members.iter().filter(|m| **m != sender.id) {
            if !self.registry.is_online(member).await {
                self.notify_best_effort(*member, title.clone(), view.message.content.clone());
            }
        }

        Ok(view)
    }
}

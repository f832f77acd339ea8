//! Reaction toggles

use std::sync::Arc;

use huddle_shared::{
    ChatError, ChatResult, Message, MessageId, MessageTarget, Reaction, ReactionKind, UserId,
};

use super::ChatHub;
use crate::websocket::{connection::Connection, events::ServerEvent};

impl ChatHub {
    /// Toggle the caller's reaction of `reaction` kind and broadcast the
    /// resulting set. Calling twice restores the original set.
    pub async fn add_reaction(
        &self,
        conn: &Arc<Connection>,
        message_id: MessageId,
        reaction: &str,
    ) -> ChatResult<Vec<Reaction>> {
        let user = conn.require_identity().await?;
        let kind: ReactionKind = reaction.parse()?;

        let existing = self
            .store
            .find_message(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound)?;
        self.ensure_can_see(user.id, &existing).await?;

        // Read-modify-write happens inside the store
        let updated = self
            .store
            .toggle_reaction(message_id, user.id, kind)
            .await?
            .ok_or(ChatError::MessageNotFound)?;

        tracing::debug!(
            message_id = %message_id,
            user_id = %user.id,
            reaction = kind.as_str(),
            added = updated.has_reaction(user.id, kind),
            "Reaction toggled"
        );

        let reactions = updated.reactions.clone();
        self.fan_out_to_audience(
            &updated,
            ServerEvent::MessageReaction {
                message_id,
                reactions: reactions.clone(),
            },
        )
        .await;

        Ok(reactions)
    }

    /// Room messages follow room visibility; private messages are visible to
    /// their two participants only
    pub(super) async fn ensure_can_see(
        &self,
        user_id: UserId,
        message: &Message,
    ) -> ChatResult<()> {
        match message.target {
            MessageTarget::Room { room_id } => {
                self.visible_room(user_id, room_id).await?;
                Ok(())
            }
            MessageTarget::Direct { recipient_id } => {
                if message.sender_id == user_id || recipient_id == user_id {
                    Ok(())
                } else {
                    Err(ChatError::AccessDenied)
                }
            }
        }
    }
}

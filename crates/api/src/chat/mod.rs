//! Chat core
//!
//! [`ChatHub`] owns the shared real-time state and implements every chat
//! operation. Operations are split by concern:
//!
//! - **presence**: authenticate / disconnect, online diffs and snapshots
//! - **membership**: room join/leave, room CRUD and history reads
//! - **pipeline**: room, private and file messages; read receipts; edit/delete
//! - **reactions**: atomic reaction toggles
//! - **typing**: ephemeral typing indicators
//!
//! Every operation writes through the [`ChatStore`] first and fans out after.
//! Nothing read from the store is cached across an await and written back.

use std::sync::Arc;

use huddle_shared::{ChatResult, Message, MessageTarget, MessageView, UserId};

use crate::auth::JwtManager;
use crate::blob::BlobStore;
use crate::notify::Notifier;
use crate::store::{self, ChatStore};
use crate::websocket::{events::ServerEvent, registry::ConnectionRegistry, room::RoomManager};

mod membership;
mod pipeline;
mod presence;
mod reactions;
pub mod typing;

pub use pipeline::{FileUpload, OutgoingMessage};
pub use typing::TypingTracker;

/// Tunables for the chat core
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Messages returned on room join
    pub history_limit: u32,
    /// Largest accepted file upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Shared chat state and operations
#[derive(Clone)]
pub struct ChatHub {
    /// Live connections and online identities
    pub registry: Arc<ConnectionRegistry>,

    /// Room subscriptions
    pub rooms: Arc<RoomManager>,

    /// Who is typing where
    pub typing: Arc<TypingTracker>,

    store: Arc<dyn ChatStore>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    jwt: Arc<JwtManager>,
    settings: HubSettings,
}

impl ChatHub {
    pub fn new(
        store: Arc<dyn ChatStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        jwt: Arc<JwtManager>,
        settings: HubSettings,
    ) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomManager::new()),
            typing: Arc::new(TypingTracker::new()),
            store,
            blobs,
            notifier,
            jwt,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn jwt(&self) -> &Arc<JwtManager> {
        &self.jwt
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    async fn enrich_one(&self, message: Message) -> ChatResult<MessageView> {
        let sender = self.store.find_user(message.sender_id).await?;
        Ok(MessageView::new(message, sender.map(|u| u.summary())))
    }

    async fn enrich(&self, messages: Vec<Message>) -> ChatResult<Vec<MessageView>> {
        store::with_senders(self.store.as_ref(), messages).await
    }

    /// Deliver an event to everyone who can see a message: the room's
    /// subscribers, or both participants of a private conversation
    async fn fan_out_to_audience(&self, message: &Message, event: ServerEvent) {
        match message.target {
            MessageTarget::Room { room_id } => {
                self.rooms.broadcast(&room_id, event).await;
            }
            MessageTarget::Direct { recipient_id } => {
                self.registry.send_to_user(&message.sender_id, event.clone()).await;
                if recipient_id != message.sender_id {
                    self.registry.send_to_user(&recipient_id, event).await;
                }
            }
        }
    }

    /// Best-effort notification, fire and forget. Failures are only logged.
    fn notify_best_effort(&self, user_id: UserId, title: String, body: String) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(user_id, &title, &body).await {
                tracing::warn!(error = %e, user_id = %user_id, "Offline notification failed");
            }
        });
    }
}

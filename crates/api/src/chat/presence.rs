//! Authentication, disconnect, and presence broadcasting

use std::sync::Arc;

use huddle_shared::{ChatError, ChatResult, PresenceStatus, User, UserId, UserSummary};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ChatHub;
use crate::websocket::{connection::Connection, events::ServerEvent};

impl ChatHub {
    /// Verify a token and bind the connection to its identity.
    ///
    /// The newest connection wins the registry entry; an older connection for
    /// the same identity stays open but no longer receives identity-targeted
    /// events.
    pub async fn authenticate(&self, conn: &Arc<Connection>, token: &str) -> ChatResult<User> {
        let claims = self
            .jwt
            .validate_token(token)
            .map_err(|e| ChatError::Auth(e.to_string()))?;

        let mut user = self
            .store
            .find_user(UserId(claims.sub))
            .await?
            .ok_or_else(|| ChatError::Auth("User not found".to_string()))?;

        let now = OffsetDateTime::now_utc();
        self.store
            .set_presence(user.id, PresenceStatus::Online, now)
            .await?;
        user.status = PresenceStatus::Online;
        user.last_seen = Some(now);

        let summary = user.summary();
        if let Some(previous) = conn.bind(summary.clone()).await {
            if previous.id != user.id {
                // Same socket switched identity; retire the old one
                self.go_offline(&previous, &conn.session_id).await;
            }
        }
        self.registry.register(summary.clone(), conn.session_id).await;

        self.registry
            .broadcast_except(&conn.session_id, ServerEvent::user_online(&summary))
            .await;
        self.broadcast_snapshot().await;
        let _ = conn.send(ServerEvent::Authenticated { user: user.clone() });

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %user.id,
            "Connection authenticated"
        );

        Ok(user)
    }

    /// Tear down a connection. In-flight work for it is not cancelled; the
    /// connection simply stops being a fan-out target.
    pub async fn disconnect(&self, conn: &Arc<Connection>) {
        self.registry.remove_connection(&conn.session_id).await;
        self.rooms.remove_connection(&conn.session_id).await;

        if let Some(user) = conn.identity().await {
            self.go_offline(&user, &conn.session_id).await;
        }
    }

    /// Mark an identity offline if `session_id` still holds its registry entry
    async fn go_offline(&self, user: &UserSummary, session_id: &Uuid) {
        if !self.registry.unregister_if(&user.id, session_id).await {
            return;
        }

        if let Err(e) = self
            .store
            .set_presence(user.id, PresenceStatus::Offline, OffsetDateTime::now_utc())
            .await
        {
            tracing::error!(error = %e, user_id = %user.id, "Failed to persist offline presence");
        }

        for room_id in self.typing.clear_user(&user.id).await {
            self.rooms
                .broadcast(
                    &room_id,
                    ServerEvent::UserStopTyping {
                        user_id: user.id,
                        username: user.username.clone(),
                        room_id,
                    },
                )
                .await;
        }

        self.registry
            .broadcast_except(session_id, ServerEvent::UserOffline { user_id: user.id })
            .await;
        self.broadcast_snapshot().await;

        tracing::info!(user_id = %user.id, session_id = %session_id, "User went offline");
    }

    /// Send the full online set to everyone so late joiners converge
    async fn broadcast_snapshot(&self) {
        let users = self.registry.online_users().await;
        self.registry
            .broadcast(ServerEvent::OnlineUsers { users })
            .await;
    }
}

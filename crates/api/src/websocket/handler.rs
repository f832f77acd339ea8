//! WebSocket handler for Axum
//!
//! Upgrades the connection, optionally authenticates from the query string,
//! and routes client events into the chat hub.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{stream::StreamExt, SinkExt};
use huddle_shared::{ChatError, ChatResult};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::chat::{ChatHub, FileUpload, OutgoingMessage};
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// A `token` query parameter authenticates right away; without one the
/// client is expected to send an `authenticate` event.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Response {
    tracing::debug!(
        with_token = params.token.is_some(),
        "WebSocket connection upgrade requested"
    );
    let hub = app_state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, params.token))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, hub: ChatHub, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = hub.registry.add_connection(Connection::new(tx)).await;
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { session_id });

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        handle_client_event(&hub, &conn, ClientEvent::Authenticate { token }).await;
    }

    // Events from one connection are handled one at a time
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&hub, &conn, event).await,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = ?e,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                        code: "invalid_event".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {} // Ignore binary messages
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    hub.disconnect(&conn).await;

    send_task.abort();
}

/// Run one client event and report any failure to this connection only
pub async fn handle_client_event(hub: &ChatHub, conn: &Arc<Connection>, event: ClientEvent) {
    let is_auth = matches!(event, ClientEvent::Authenticate { .. });

    if let Err(err) = dispatch(hub, conn, event).await {
        match &err {
            ChatError::Upstream(detail) => {
                tracing::error!(
                    session_id = %conn.session_id,
                    error = %detail,
                    "Event failed upstream"
                );
            }
            other => {
                tracing::debug!(session_id = %conn.session_id, error = %other, "Event rejected");
            }
        }

        let event = match err {
            ChatError::Auth(_) if is_auth => ServerEvent::AuthenticationError {
                message: err.client_message(),
            },
            _ => ServerEvent::error(&err),
        };
        let _ = conn.send(event);
    }
}

async fn dispatch(hub: &ChatHub, conn: &Arc<Connection>, event: ClientEvent) -> ChatResult<()> {
    use ClientEvent::*;

    match event {
        Authenticate { token } => {
            hub.authenticate(conn, &token).await?;
        }

        JoinRoom { room_id } => {
            hub.join_room(conn, room_id).await?;
        }

        LeaveRoom { room_id } => {
            hub.leave_room(conn, room_id).await?;
        }

        SendMessage {
            content,
            room_id,
            message_type,
        } => {
            hub.send_message(
                conn,
                OutgoingMessage {
                    content,
                    room_id,
                    kind: message_type,
                },
            )
            .await?;
        }

        SendPrivateMessage {
            content,
            recipient_id,
        } => {
            hub.send_private_message(conn, content, recipient_id).await?;
        }

        TypingStart { room_id } => hub.start_typing(conn, room_id).await?,

        TypingStop { room_id } => hub.stop_typing(conn, room_id).await?,

        AddReaction {
            message_id,
            reaction,
        } => {
            hub.add_reaction(conn, message_id, &reaction).await?;
        }

        UploadFile {
            file_data,
            file_name,
            file_type,
            room_id,
        } => {
            let bytes = decode_file_data(&file_data)?;
            hub.upload_file(
                conn,
                FileUpload {
                    bytes,
                    file_name,
                    mime_type: file_type,
                    room_id,
                },
            )
            .await?;
        }

        MarkAsRead { message_id } => hub.mark_as_read(conn, message_id).await?,

        Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }

    Ok(())
}

/// Decode base64 file data, accepting a `data:<mime>;base64,` prefix
fn decode_file_data(data: &str) -> ChatResult<Vec<u8>> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|_| ChatError::validation("File data is not valid base64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        assert_eq!(decode_file_data("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_data_url() {
        assert_eq!(
            decode_file_data("data:text/plain;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_file_data("not base64!!"),
            Err(ChatError::Validation(_))
        ));
    }
}

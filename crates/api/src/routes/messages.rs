//! Message history, search, edit and delete

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use huddle_shared::{MessageId, MessagePage, MessageView, PageRequest, RoomId, UserId};
use serde::{Deserialize, Serialize};

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: MessageView,
}

/// Paginated room history
pub async fn room_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(room_id): Path<RoomId>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<MessagePage>> {
    let page = state
        .hub
        .room_history(auth_user.user_id, room_id, page)
        .await?;
    Ok(Json(page))
}

/// Paginated private conversation with another user
pub async fn private_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<UserId>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<MessagePage>> {
    let page = state
        .hub
        .private_history(auth_user.user_id, user_id, page)
        .await?;
    Ok(Json(page))
}

pub async fn search_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state
        .hub
        .search(auth_user.user_id, &query.query, query.room_id)
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let message = state
        .hub
        .edit_message(auth_user.user_id, message_id, req.content)
        .await?;
    Ok(Json(MessageResponse { message }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .delete_message(auth_user.user_id, message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

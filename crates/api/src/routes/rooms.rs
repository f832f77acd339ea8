//! Room routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use huddle_shared::{NewRoom, Room, RoomId};
use serde::Serialize;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<Room>,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room: Room,
}

/// Public rooms plus private rooms the caller belongs to
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<RoomsResponse>> {
    let rooms = state.hub.list_rooms(auth_user.user_id).await?;
    Ok(Json(RoomsResponse { rooms }))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<NewRoom>,
) -> ApiResult<(StatusCode, Json<RoomResponse>)> {
    let room = state.hub.create_room(req, auth_user.user_id).await?;
    Ok((StatusCode::CREATED, Json(RoomResponse { room })))
}

pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<RoomResponse>> {
    let room = state.hub.room_details(auth_user.user_id, room_id).await?;
    Ok(Json(RoomResponse { room }))
}

pub async fn join_room(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<StatusCode> {
    state.hub.join_membership(auth_user.user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_room(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<StatusCode> {
    state.hub.leave_membership(auth_user.user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

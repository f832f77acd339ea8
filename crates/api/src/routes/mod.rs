//! HTTP routes

pub mod health;
pub mod messages;
pub mod rooms;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    // Protected API routes (Bearer token required) - under /api
    let api_routes = Router::new()
        // Room routes
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/:room_id", get(rooms::get_room))
        .route("/rooms/:room_id/join", post(rooms::join_room))
        .route("/rooms/:room_id/leave", post(rooms::leave_room))
        // Message routes (static segments before :id)
        .route("/messages/search", get(messages::search_messages))
        .route("/messages/private/:user_id", get(messages::private_messages))
        .route(
            "/messages/:id",
            get(messages::room_messages)
                .put(messages::edit_message)
                .delete(messages::delete_message),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // WebSocket route (auth handled over the socket)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let upload_dir = state.config.upload_dir.clone();

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

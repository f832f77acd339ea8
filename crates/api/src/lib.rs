//! Huddle API Library
//!
//! Real-time chat server: WebSocket transport, chat core, persistence and
//! the HTTP collaborator routes.

pub mod auth;
pub mod blob;
pub mod chat;
pub mod config;
pub mod error;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use chat::{ChatHub, HubSettings};
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

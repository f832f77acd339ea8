//! WebSocket transport for real-time chat
//!
//! # Architecture
//!
//! - **Connection**: One live session, bound to at most one identity
//! - **Registry**: Every live connection plus the identity -> connection map
//! - **Room**: Room pub/sub, at most one room per connection
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod registry;
pub mod room;

pub use handler::ws_handler;

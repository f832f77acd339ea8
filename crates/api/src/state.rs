//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::AuthState;
use crate::chat::ChatHub;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: ChatHub,
    /// Present only when running against Postgres
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, hub: ChatHub, pool: Option<PgPool>) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            pool,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: Arc::clone(self.hub.jwt()),
        }
    }
}

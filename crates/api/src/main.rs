//! Huddle API server

use std::sync::Arc;

use anyhow::Context;
use huddle_api::{
    auth::JwtManager,
    blob::LocalBlobStore,
    notify::WebhookNotifier,
    routes::create_router,
    store::{ChatStore, MemoryStore, PgStore},
    AppState, ChatHub, Config, HubSettings,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let (store, pool) = match &config.database_url {
        Some(database_url) => {
            let pool =
                huddle_shared::db::create_pool(database_url, config.database_max_connections)
                    .await
                    .context("Failed to connect to database")?;
            huddle_shared::db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Using Postgres store");
            let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    let hub = ChatHub::new(
        store,
        Arc::new(LocalBlobStore::new(&config.upload_dir, &config.public_url)),
        Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone())),
        Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours)),
        HubSettings {
            history_limit: config.history_limit,
            max_upload_bytes: config.max_upload_bytes,
        },
    );

    let bind_address = config.bind_address.clone();
    let app = create_router(AppState::new(config, hub, pool));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Huddle API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,huddle_api=debug,tower_http=info".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

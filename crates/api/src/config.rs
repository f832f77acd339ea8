//! Application configuration

use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database (absent: in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Uploads
    pub upload_dir: String,
    pub max_upload_bytes: usize,

    // Chat
    pub history_limit: u32,

    // Notifications
    pub notify_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: optional("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 20)?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: parsed("JWT_EXPIRY_HOURS", 24)?,

            // Uploads
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,

            // Chat
            history_limit: parsed("HISTORY_LIMIT", 50)?,

            // Notifications
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
        })
    }
}

/// Unset and empty are both treated as absent
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DATABASE_URL",
        "JWT_SECRET",
        "JWT_EXPIRY_HOURS",
        "MAX_UPLOAD_BYTES",
        "HISTORY_LIMIT",
        "NOTIFY_WEBHOOK_URL",
    ];

    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn setup_minimal_config() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert_eq!(config.jwt_expiry_hours, 24);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.history_limit, 50);
        assert!(config.notify_webhook_url.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_secret() {
        cleanup_config();

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    #[serial]
    fn test_short_secret_rejected() {
        cleanup_config();
        env::set_var("JWT_SECRET", "too-short");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_number_rejected() {
        setup_minimal_config();
        env::set_var("HISTORY_LIMIT", "lots");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("HISTORY_LIMIT"))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_empty_database_url_means_memory() {
        setup_minimal_config();
        env::set_var("DATABASE_URL", "  ");

        assert!(Config::from_env().unwrap().database_url.is_none());

        cleanup_config();
    }
}

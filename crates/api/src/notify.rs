//! Offline notification delivery
//!
//! Sends push-style notifications to a webhook. Delivery is best effort:
//! callers log failures and carry on.

use std::time::Duration;

use async_trait::async_trait;
use huddle_shared::{ChatError, ChatResult, UserId};
use serde_json::json;

/// Upper bound on one webhook delivery
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, title: &str, body: &str) -> ChatResult<()>;
}

/// Webhook notifier
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_default(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, user_id: UserId, title: &str, body: &str) -> ChatResult<()> {
        let Some(ref webhook_url) = self.webhook_url else {
            tracing::debug!(user_id = %user_id, "Notification webhook not configured, skipping");
            return Ok(());
        };

        let payload = json!({
            "userId": user_id,
            "title": title,
            "body": body,
        });

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChatError::Upstream(format!("notification webhook: {e}")))?;

        if !response.status().is_success() {
            return Err(ChatError::Upstream(format!(
                "notification webhook returned {}",
                response.status()
            )));
        }

        tracing::debug!(user_id = %user_id, "Offline notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_webhook_is_a_noop() {
        let notifier = WebhookNotifier::new(None);
        assert!(notifier.notify(UserId::new(), "t", "b").await.is_ok());
    }

    #[tokio::test]
    async fn test_posts_payload_to_webhook() {
        let mut server = mockito::Server::new_async().await;
        let user_id = UserId::new();
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(json!({
                "userId": user_id,
                "title": "New message from alice",
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", server.url())));
        notifier
            .notify(user_id, "New message from alice", "hi")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_upstream_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(503)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", server.url())));
        let result = notifier.notify(UserId::new(), "t", "b").await;
        assert!(matches!(result, Err(ChatError::Upstream(_))));
    }
}

//! Password-reset delivery
//!
//! Without a relay configured the reset link only goes to the log, which is
//! enough for local development. With `mail.webhook_url` set, the message is
//! POSTed as `{from, to, subject, text}` to an HTTP mail relay.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MailConfig;

pub const RESET_SUBJECT: &str = "SmartSkill password reset";

/// Delivers password-reset links
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_link(&self, to: &str, link: &str) -> Result<()>;
}

/// Body text of the reset mail
pub fn reset_message(link: &str) -> String {
    format!(
        "You requested a password reset.\n\n\
         Open the link below to choose a new password. It expires in one hour.\n\n\
         {}\n\n\
         If you did not request this, you can ignore this message.",
        link
    )
}

/// Writes reset links to the log
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_link(&self, to: &str, link: &str) -> Result<()> {
        tracing::info!("Password reset link for {}: {}", to, link);
        Ok(())
    }
}

/// Sends mail through an HTTP relay
pub struct WebhookMailer {
    http: Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            url: url.into(),
            token,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send_reset_link(&self, to: &str, link: &str) -> Result<()> {
        let payload = json!({
            "from": self.from,
            "to": to,
            "subject": RESET_SUBJECT,
            "text": reset_message(link),
        });

        let mut request = self.http.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach mail relay")?;

        if response.status().is_success() {
            tracing::info!("Password reset mail sent to {}", to);
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Mail relay failed: {} - {}", status, body)
        }
    }
}

/// Relay mailer when configured, log mailer otherwise
pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Arc::new(WebhookMailer::new(url, config.webhook_token.clone(), config.from.clone())),
        None => Arc::new(LogMailer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::Value;
    use tokio::sync::mpsc;

    /// Local relay that forwards each received (authorization, body) pair
    async fn capture_relay() -> (String, mpsc::UnboundedReceiver<(Option<String>, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/send",
                post(
                    |State(tx): State<mpsc::UnboundedSender<(Option<String>, Value)>>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|h| h.to_str().ok())
                            .map(str::to_string);
                        let _ = tx.send((auth, body));
                        "ok"
                    },
                ),
            )
            .with_state(tx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/send", addr), rx)
    }

    #[test]
    fn message_contains_link() {
        let text = reset_message("http://localhost:5173/reset-password/abc");
        assert!(text.contains("http://localhost:5173/reset-password/abc"));
    }

    #[test]
    fn log_mailer_always_succeeds() {
        tokio_test::assert_ok!(tokio_test::block_on(
            LogMailer.send_reset_link("a@b.c", "http://x/reset")
        ));
    }

    #[tokio::test]
    async fn unreachable_relay_is_an_error() {
        let mailer = WebhookMailer::new("http://127.0.0.1:1/send", None, "no-reply@test");
        assert!(mailer.send_reset_link("a@b.c", "http://x/reset").await.is_err());
    }

    #[tokio::test]
    async fn webhook_posts_message_with_bearer_token() {
        let (url, mut rx) = capture_relay().await;
        let mailer = WebhookMailer::new(url, Some("relay-secret".into()), "no-reply@test");
        mailer
            .send_reset_link("ada@example.com", "http://x/reset-password/abc")
            .await
            .unwrap();

        let (auth, body) = rx.recv().await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer relay-secret"));
        assert_eq!(body["from"], "no-reply@test");
        assert_eq!(body["to"], "ada@example.com");
        assert_eq!(body["subject"], RESET_SUBJECT);
        assert!(body["text"].as_str().unwrap().contains("http://x/reset-password/abc"));
    }

    #[tokio::test]
    async fn configured_url_selects_the_relay() {
        let (url, mut rx) = capture_relay().await;
        let config = MailConfig {
            webhook_url: Some(url),
            ..Default::default()
        };
        from_config(&config).send_reset_link("a@b.c", "http://x/reset").await.unwrap();

        let (auth, body) = rx.recv().await.unwrap();
        assert!(auth.is_none());
        assert_eq!(body["to"], "a@b.c");
    }

    #[tokio::test]
    async fn blank_url_falls_back_to_log() {
        let config = MailConfig {
            webhook_url: Some("  ".into()),
            ..Default::default()
        };
        // a relay at a blank URL could not succeed
        assert!(from_config(&config).send_reset_link("a@b.c", "http://x/reset").await.is_ok());
    }
}

//! Slack Web API client for channel announcements.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SlackConfig;
use crate::error::{Result, TrackerError};

/// Chat delivery collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Post `text` to `channel`; returns the message timestamp on success.
    async fn post_message(&self, channel: &str, text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Slack Web API client posting with a bot token
pub struct SlackClient {
    http: Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    /// Client for `config`; fails when no token is set
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| TrackerError::InvalidConfig("slack.token is not set".to_string()))?;
        Ok(Self::with_client(Client::new(), &config.api_base_url, token))
    }

    /// Client over an existing HTTP client and API base URL
    pub fn with_client(http: Client, base_url: &str, token: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl ChatSender for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<String> {
        let response: PostMessageResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&PostMessageRequest { channel, text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(TrackerError::Chat(
                response.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        debug!(channel, ts = ?response.ts, "Posted Slack message");
        Ok(response.ts.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_post_message_sends_bearer_and_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxp-test")
            .match_body(Matcher::Json(serde_json::json!({"channel": "C123", "text": "hello"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"ts":"1700000000.000100"}"#)
            .create_async()
            .await;

        let client = SlackClient::with_client(Client::new(), &server.url(), "xoxp-test".to_string());
        let ts = client.post_message("C123", "hello").await.expect("posted");

        assert_eq!(ts, "1700000000.000100");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_message_surfaces_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;

        let client = SlackClient::with_client(Client::new(), &server.url(), "t".to_string());
        let err = client.post_message("nope", "hello").await.expect_err("api error");
        assert!(matches!(err, TrackerError::Chat(ref code) if code == "channel_not_found"));
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let config = SlackConfig {
            api_base_url: "https://slack.com/api".to_string(),
            token: None,
            default_channel: None,
        };
        assert!(matches!(SlackClient::new(&config), Err(TrackerError::InvalidConfig(_))));
    }
}

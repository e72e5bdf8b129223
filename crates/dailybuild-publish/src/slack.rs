//! Slack `chat.postMessage` client.

use async_trait::async_trait;
use dailybuild_core::{Notifier, NotifyTarget};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::USER_AGENT;

/// Bot token plus channel settings.
#[derive(Clone)]
pub struct SlackConfig {
    pub token: String,
    pub target: NotifyTarget,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

impl SlackConfig {
    pub fn new(token: impl Into<String>, target: NotifyTarget) -> Self {
        Self {
            token: token.into(),
            target,
        }
    }

    /// `None` when the token is absent or blank.
    pub fn from_token(token: Option<String>, target: &NotifyTarget) -> Option<Self> {
        token
            .filter(|t| !t.trim().is_empty())
            .map(|t| Self::new(t, target.clone()))
    }
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    config: SlackConfig,
    http_client: Client,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(PublishError::NotConfigured("Slack token"));
        }
        let http_client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    /// Post `text` to the configured channel.
    pub async fn post_message(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/chat.postMessage",
            self.config.target.api_base.trim_end_matches('/')
        );
        debug!(url = %url, channel = %self.config.target.channel, "posting to Slack");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&PostMessage {
                channel: &self.config.target.channel,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Slack rejected message");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: PostMessageResponse = response.json().await?;
        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(reason = %reason, "Slack API returned ok=false");
            return Err(PublishError::Slack(reason));
        }

        info!(channel = %self.config.target.channel, "posted to Slack");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, message: &str) -> anyhow::Result<()> {
        Ok(self.post_message(message).await?)
    }
}

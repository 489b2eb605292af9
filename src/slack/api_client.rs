//! Slack Web API client used by the Socket Mode runtime and the router.
//!
//! Every call is attempted exactly once; failures surface to the caller,
//! which decides what the user sees.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::traits::{ChatTransport, PostedMessage};

#[derive(Debug, Clone, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(
        api_base: &str,
        app_token: &str,
        bot_token: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("slackrelay")
            .timeout(request_timeout)
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    /// Resolve the bot's own user id via `auth.test`, so its messages can
    /// be filtered out of the inbound stream.
    pub async fn resolve_bot_user_id(&self) -> Result<String> {
        let response: AuthTestResponse = self
            .request_json("auth.test", || {
                self.http
                    .post(format!("{}/auth.test", self.api_base))
                    .bearer_auth(&self.bot_token)
            })
            .await?;

        if !response.ok {
            bail!(
                "slack auth.test failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))
    }

    /// Request a Socket Mode websocket URL via `apps.connections.open`.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let response: OpenSocketResponse = self
            .request_json("apps.connections.open", || {
                self.http
                    .post(format!("{}/apps.connections.open", self.api_base))
                    .bearer_auth(&self.app_token)
            })
            .await?;

        if !response.ok {
            bail!(
                "slack apps.connections.open failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> reqwest::RequestBuilder,
    {
        let response = builder()
            .send()
            .await
            .with_context(|| format!("slack api {operation} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("slack api {operation} failed with status {}", status.as_u16());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode slack {operation} response"))
    }
}

#[async_trait]
impl ChatTransport for SlackApiClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response: ChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;

        if !response.ok {
            bail!(
                "slack chat.postMessage failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        Ok(PostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response
                .ts
                .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?,
        })
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
        });

        let response: ChatMessageResponse = self
            .request_json("chat.update", || {
                self.http
                    .post(format!("{}/chat.update", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;

        if !response.ok {
            bail!(
                "slack chat.update failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}

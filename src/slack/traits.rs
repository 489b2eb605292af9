use anyhow::Result;
use async_trait::async_trait;

/// Handle to a message the bot has posted, used to update it in place.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Outbound chat surface the router replies through.
///
/// The production implementation is the Slack Web API client; tests use an
/// in-process fake.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message, threaded under `thread_ts` when present. Returns a
    /// handle to the posted message.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage>;

    /// Replace the text of a previously posted message.
    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()>;

    /// The name of this transport implementation.
    fn name(&self) -> &str;
}

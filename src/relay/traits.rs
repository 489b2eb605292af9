use async_trait::async_trait;
use thiserror::Error;

/// Normalized result of one relay round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    /// Answer text extracted from the remote response.
    pub text: String,
    /// Session id for the conversation. A fresh id in the response
    /// overrides the caller-supplied one; otherwise the caller-supplied id
    /// passes through unchanged.
    pub session_id: Option<String>,
}

/// A failed relay round-trip. Surfaced once per user event; there is no
/// retry at this layer.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The endpoint answered with a non-success status.
    #[error("agent API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// The request never produced a usable response.
    #[error("agent request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One-shot message relay toward the remote conversational agent.
#[async_trait]
pub trait RelayProvider: Send + Sync {
    /// Send `message`, continuing the conversation identified by
    /// `session_id` when present.
    async fn send(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<RelayReply, RelayError>;

    /// The name of this relay implementation.
    fn name(&self) -> &str;
}

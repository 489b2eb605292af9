//! Socket Mode envelope parsing and event normalization.
//!
//! The raw Slack payload is reduced to [`SlackEvent`] before it reaches the
//! router. Events from the bot itself, bot-authored subtypes, and payloads
//! missing required fields are dropped here.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// One Socket Mode envelope as delivered over the websocket.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketEnvelope {
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(rename = "type")]
    pub envelope_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Classes of inbound events the relay handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlackEventKind {
    AppMention,
    DirectMessage,
}

impl SlackEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppMention => "app_mention",
            Self::DirectMessage => "message.im",
        }
    }
}

/// A normalized inbound message event.
#[derive(Debug, Clone)]
pub struct SlackEvent {
    pub kind: SlackEventKind,
    pub channel: String,
    pub user: String,
    pub text: String,
    /// Timestamp of this message.
    pub ts: String,
    /// Timestamp of the thread root, present only for threaded replies.
    pub thread_ts: Option<String>,
}

impl SlackEvent {
    /// The timestamp replies thread under: the existing thread root, or
    /// this message itself when it starts a new conversation.
    pub fn root_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn is_threaded(&self) -> bool {
        self.thread_ts.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct EventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    event: EventPayload,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

/// Decode a websocket frame into an envelope. Control frames yield `None`.
pub fn parse_envelope(message: &WsMessage) -> Result<Option<SocketEnvelope>> {
    let text = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .context("invalid utf-8 slack socket payload")?,
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            return Ok(None)
        }
    };

    let envelope = serde_json::from_str::<SocketEnvelope>(&text)
        .context("failed to parse slack socket envelope")?;
    Ok(Some(envelope))
}

/// Reduce an `events_api` envelope to a [`SlackEvent`], or `None` for
/// anything the relay ignores: non-event envelopes, bot-authored messages,
/// events outside the handled channel classes, and malformed payloads.
pub fn normalize_event(envelope: &SocketEnvelope, bot_user_id: &str) -> Result<Option<SlackEvent>> {
    if envelope.envelope_type != "events_api" {
        return Ok(None);
    }

    let callback = serde_json::from_value::<EventCallbackEnvelope>(envelope.payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }

    let event = callback.event;
    if event.subtype.as_deref() == Some("bot_message") || event.bot_id.is_some() {
        return Ok(None);
    }
    let user = match event.user {
        Some(user) if !user.trim().is_empty() => user,
        _ => return Ok(None),
    };
    if user == bot_user_id {
        return Ok(None);
    }

    let channel = match event.channel {
        Some(channel) if !channel.trim().is_empty() => channel,
        _ => return Ok(None),
    };
    let ts = match event.ts {
        Some(ts) if !ts.trim().is_empty() => ts,
        _ => return Ok(None),
    };

    let kind = match event.event_type.as_str() {
        "app_mention" => SlackEventKind::AppMention,
        "message" if event.channel_type.as_deref() == Some("im") || channel.starts_with('D') => {
            SlackEventKind::DirectMessage
        }
        _ => return Ok(None),
    };

    Ok(Some(SlackEvent {
        kind,
        channel,
        user,
        text: event.text.unwrap_or_default(),
        ts,
        thread_ts: event.thread_ts,
    }))
}

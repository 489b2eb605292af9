//! HTTP relay client for the remote conversational agent endpoint.
//!
//! The endpoint accepts a JSON body carrying a fixed configuration block
//! plus the prompt, and answers with a loosely-shaped JSON payload. The
//! response shape is not strictly contracted, so the answer text is probed
//! across the known field names in a fixed priority order.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::sanitize_api_error;
use super::traits::{RelayError, RelayProvider, RelayReply};
use crate::config::RelayConfig;

/// Answer-text field names probed in priority order.
const REPLY_FIELDS: [&str; 3] = ["response", "chatMessage", "content"];

pub struct HttpRelayClient {
    endpoint: String,
    api_key: String,
    user_id: String,
    agent_id: String,
    temperature: f64,
    max_results: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(rename = "agentId")]
    agent_id: &'a str,
    temperature: f64,
    #[serde(rename = "maxResults")]
    max_results: u32,
    prompt: &'a str,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl HttpRelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            user_id: config.user_id.clone(),
            agent_id: config.agent_id.clone(),
            temperature: config.temperature,
            max_results: config.max_results,
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

fn first_nonempty(text: Option<&str>) -> Option<String> {
    text.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Extract the answer text and session id from a successful response body.
///
/// Probes the known reply fields in priority order, then accepts a bare
/// JSON string, then a non-JSON text body, and finally falls back to
/// serializing the whole payload.
fn normalize_reply(body: &str, caller_session_id: Option<&str>) -> RelayReply {
    let fallback_session = caller_session_id.map(ToString::to_string);

    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        return RelayReply {
            text: body.trim().to_string(),
            session_id: fallback_session,
        };
    };

    if let Value::String(text) = &payload {
        return RelayReply {
            text: text.clone(),
            session_id: fallback_session,
        };
    }

    let session_id = first_nonempty(payload.get("sessionId").and_then(Value::as_str))
        .or(fallback_session);

    for field in REPLY_FIELDS {
        if let Some(text) = first_nonempty(payload.get(field).and_then(Value::as_str)) {
            return RelayReply { text, session_id };
        }
    }

    RelayReply {
        text: serde_json::to_string(&payload).unwrap_or_default(),
        session_id,
    }
}

/// Pull a human-readable error detail out of a failed response body.
fn extract_error_detail(body: &str, status: u16) -> String {
    if let Ok(payload) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message"] {
            if let Some(detail) = first_nonempty(payload.get(field).and_then(Value::as_str)) {
                return detail;
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl RelayProvider for HttpRelayClient {
    async fn send(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<RelayReply, RelayError> {
        let request = RelayRequest {
            user_id: &self.user_id,
            agent_id: &self.agent_id,
            temperature: self.temperature,
            max_results: self.max_results,
            prompt: message,
            session_id,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RelayError::Api {
                status: status.as_u16(),
                detail: sanitize_api_error(&extract_error_detail(&body, status.as_u16())),
            });
        }

        Ok(normalize_reply(&body, session_id))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_config(endpoint: &str) -> RelayConfig {
        RelayConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("test-key".to_string()),
            user_id: "relay-user".to_string(),
            agent_id: "relay-agent".to_string(),
            temperature: 0.7,
            max_results: 5,
            timeout_secs: 5,
        }
    }

    // ── Response-shape probing ───────────────────────────────

    #[test]
    fn normalize_probes_response_field() {
        let reply = normalize_reply(r#"{"response": "x"}"#, None);
        assert_eq!(reply.text, "x");
    }

    #[test]
    fn normalize_probes_chat_message_field() {
        let reply = normalize_reply(r#"{"chatMessage": "x"}"#, None);
        assert_eq!(reply.text, "x");
    }

    #[test]
    fn normalize_probes_content_field() {
        let reply = normalize_reply(r#"{"content": "x"}"#, None);
        assert_eq!(reply.text, "x");
    }

    #[test]
    fn normalize_accepts_bare_json_string() {
        let reply = normalize_reply(r#""x""#, None);
        assert_eq!(reply.text, "x");
    }

    #[test]
    fn normalize_accepts_raw_text_body() {
        let reply = normalize_reply("plain answer", None);
        assert_eq!(reply.text, "plain answer");
    }

    #[test]
    fn normalize_serializes_unrecognized_object() {
        let reply = normalize_reply(r#"{"verdict": "x"}"#, None);
        assert!(reply.text.contains("verdict"));
        assert!(reply.text.contains("x"));
    }

    #[test]
    fn normalize_prefers_response_over_later_fields() {
        let reply = normalize_reply(r#"{"content": "later", "response": "first"}"#, None);
        assert_eq!(reply.text, "first");
    }

    #[test]
    fn normalize_skips_empty_reply_fields() {
        let reply = normalize_reply(r#"{"response": "  ", "chatMessage": "x"}"#, None);
        assert_eq!(reply.text, "x");
    }

    // ── Session id propagation ───────────────────────────────

    #[test]
    fn response_session_id_overrides_callers() {
        let reply = normalize_reply(r#"{"response": "x", "sessionId": "new"}"#, Some("old"));
        assert_eq!(reply.session_id.as_deref(), Some("new"));
    }

    #[test]
    fn callers_session_id_passes_through_when_absent() {
        let reply = normalize_reply(r#"{"response": "x"}"#, Some("old"));
        assert_eq!(reply.session_id.as_deref(), Some("old"));
    }

    #[test]
    fn no_session_id_anywhere_stays_none() {
        let reply = normalize_reply(r#"{"response": "x"}"#, None);
        assert!(reply.session_id.is_none());
    }

    // ── Error detail extraction ──────────────────────────────

    #[test]
    fn error_detail_prefers_error_field() {
        let detail = extract_error_detail(r#"{"error": "quota exceeded"}"#, 429);
        assert_eq!(detail, "quota exceeded");
    }

    #[test]
    fn error_detail_falls_back_to_message_field() {
        let detail = extract_error_detail(r#"{"message": "bad agent id"}"#, 400);
        assert_eq!(detail, "bad agent id");
    }

    #[test]
    fn error_detail_falls_back_to_body_then_status() {
        assert_eq!(extract_error_detail("upstream broke", 502), "upstream broke");
        assert_eq!(extract_error_detail("   ", 502), "HTTP 502");
    }

    // ── HTTP round-trips ─────────────────────────────────────

    #[tokio::test]
    async fn send_posts_fixed_config_block_with_prompt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/relay")
                    .header("authorization", "Bearer test-key")
                    .json_body_includes(
                        r#"{"userId": "relay-user", "agentId": "relay-agent", "prompt": "Hello"}"#,
                    );
                then.status(200)
                    .json_body(json!({"response": "Hi", "sessionId": "abc"}));
            })
            .await;

        let client = HttpRelayClient::new(&test_config(&server.url("/relay")));
        let reply = client.send("Hello", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply.text, "Hi");
        assert_eq!(reply.session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn send_includes_session_id_on_continuation() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/relay")
                    .json_body_includes(r#"{"sessionId": "abc"}"#);
                then.status(200).json_body(json!({"response": "again"}));
            })
            .await;

        let client = HttpRelayClient::new(&test_config(&server.url("/relay")));
        let reply = client.send("More", Some("abc")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply.session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn send_surfaces_remote_error_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(500).json_body(json!({"error": "agent offline"}));
            })
            .await;

        let client = HttpRelayClient::new(&test_config(&server.url("/relay")));
        let err = client.send("Hello", None).await.unwrap_err();

        match err {
            RelayError::Api { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "agent offline");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}

//! Socket Mode runtime — owns the websocket session and feeds the router.
//!
//! Each accepted event is handled in its own task, so a slow agent call
//! never blocks the socket loop or events on other threads.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{info, warn};

use super::api_client::SlackApiClient;
use super::events::{normalize_event, parse_envelope};
use crate::router::EventRouter;

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

pub struct SocketModeRuntime {
    client: SlackApiClient,
    router: Arc<EventRouter>,
    bot_user_id: String,
    reconnect_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SocketModeRuntime {
    pub fn new(
        client: SlackApiClient,
        router: Arc<EventRouter>,
        bot_user_id: String,
        reconnect_delay: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            router,
            bot_user_id,
            reconnect_delay,
            shutdown,
        }
    }

    /// Connect, process envelopes, reconnect on drop. Returns once the
    /// shutdown flag flips.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            let socket_url = match self.client.open_socket_connection().await {
                Ok(url) => url,
                Err(error) => {
                    warn!("failed to open socket connection: {error:#}");
                    if self.wait_for_reconnect().await == SessionEnd::Shutdown {
                        return Ok(());
                    }
                    continue;
                }
            };

            info!("socket mode connected");
            match self.run_socket_session(&socket_url).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Reconnect) => {}
                Err(error) => warn!("socket session ended with error: {error:#}"),
            }

            if self.wait_for_reconnect().await == SessionEnd::Shutdown {
                return Ok(());
            }
        }
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    return Ok(SessionEnd::Shutdown);
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(SessionEnd::Reconnect);
                    };
                    let message = message_result.context("failed reading socket message")?;
                    let Some(envelope) = parse_envelope(&message)? else {
                        continue;
                    };

                    // Ack before processing so Slack does not redeliver.
                    if let Some(envelope_id) = &envelope.envelope_id {
                        let ack = json!({ "envelope_id": envelope_id }).to_string();
                        sink.send(WsMessage::Text(ack.into()))
                            .await
                            .context("failed to send socket ack")?;
                    }

                    if envelope.envelope_type == "disconnect" {
                        info!("socket mode disconnect requested by slack");
                        return Ok(SessionEnd::Reconnect);
                    }

                    match normalize_event(&envelope, &self.bot_user_id) {
                        Ok(Some(event)) => {
                            let router = Arc::clone(&self.router);
                            tokio::spawn(async move {
                                router.handle_event(event).await;
                            });
                        }
                        Ok(None) => {}
                        Err(error) => warn!("dropping undecodable event: {error:#}"),
                    }
                }
            }
        }
    }

    async fn wait_for_reconnect(&mut self) -> SessionEnd {
        tokio::select! {
            _ = self.shutdown.changed() => SessionEnd::Shutdown,
            _ = tokio::time::sleep(self.reconnect_delay) => SessionEnd::Reconnect,
        }
    }
}

//! Event router — dispatches normalized Slack events to the session store
//! and the relay, and threads replies back through the chat transport.
//!
//! Every failure past event normalization is converted to a user-visible
//! reply in the same thread; nothing here propagates out of `handle_event`.

pub mod commands;

pub use commands::Command;

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::relay::RelayProvider;
use crate::sessions::SessionStore;
use crate::slack::{ChatTransport, PostedMessage, SlackEvent};
use commands::help_text;

const GREETING_REPLY: &str =
    "👋 Hi! Mention me with a question and I'll ask the agent. Try `help` for commands.";
const WORKING_REPLY: &str = "🤔 Working on it...";
const ERROR_REPLY: &str = "⚠️ Something went wrong handling that message. Please try again.";

pub struct EventRouter {
    store: Arc<dyn SessionStore>,
    relay: Arc<dyn RelayProvider>,
    chat: Arc<dyn ChatTransport>,
    mention_marker: Regex,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        relay: Arc<dyn RelayProvider>,
        chat: Arc<dyn ChatTransport>,
        bot_user_id: &str,
    ) -> Result<Self> {
        let mention_marker = Regex::new(&format!(r"\s*<@{}>\s*", regex::escape(bot_user_id)))
            .context("failed to compile mention marker pattern")?;
        Ok(Self {
            store,
            relay,
            chat,
            mention_marker,
        })
    }

    /// Handle one inbound event end to end. Never fails; errors become
    /// replies in the event's thread.
    pub async fn handle_event(&self, event: SlackEvent) {
        let correlation_id = Uuid::new_v4();
        let text = self.clean_text(&event);
        info!(
            kind = event.kind.as_str(),
            channel = %event.channel,
            threaded = event.is_threaded(),
            correlation = %correlation_id,
            "event received"
        );

        if text.is_empty() {
            self.post_threaded(&event, GREETING_REPLY).await;
            return;
        }

        if let Some(command) = Command::parse(&text) {
            self.handle_command(&event, command).await;
            return;
        }

        self.relay_flow(&event, &text).await;
    }

    /// Strip the bot's mention marker and surrounding whitespace.
    fn clean_text(&self, event: &SlackEvent) -> String {
        self.mention_marker
            .replace_all(&event.text, " ")
            .trim()
            .to_string()
    }

    /// The relay path: resolve → placeholder → send → record → update.
    async fn relay_flow(&self, event: &SlackEvent, text: &str) {
        let root_ts = event.root_ts().to_string();

        let session_id = match self
            .store
            .resolve(&event.channel, event.thread_ts.as_deref())
            .await
        {
            Ok(resolved) => resolved,
            Err(error) => {
                warn!(channel = %event.channel, "session lookup failed: {error:#}");
                self.post_threaded(event, ERROR_REPLY).await;
                return;
            }
        };

        let placeholder = match self
            .chat
            .post_message(&event.channel, WORKING_REPLY, Some(&root_ts))
            .await
        {
            Ok(posted) => Some(posted),
            Err(error) => {
                warn!(channel = %event.channel, "failed to post placeholder: {error:#}");
                None
            }
        };

        match self.relay.send(text, session_id.as_deref()).await {
            Ok(reply) => {
                // A session is only born at the root of a new thread, keyed
                // by the event's own timestamp.
                if !event.is_threaded() {
                    if let Some(new_session) = reply.session_id.as_deref() {
                        if let Err(error) = self
                            .store
                            .record(&event.channel, &event.ts, new_session)
                            .await
                        {
                            warn!(channel = %event.channel, "failed to record session: {error:#}");
                            self.deliver(event, &root_ts, placeholder, ERROR_REPLY).await;
                            return;
                        }
                    }
                }
                self.deliver(event, &root_ts, placeholder, &reply.text).await;
            }
            Err(error) => {
                warn!(channel = %event.channel, "relay call failed: {error}");
                let message = format!("⚠️ I couldn't get an answer from the agent: {error}");
                self.deliver(event, &root_ts, placeholder, &message).await;
            }
        }
    }

    async fn handle_command(&self, event: &SlackEvent, command: Command) {
        let root_ts = event.root_ts().to_string();
        let reply = match command {
            Command::Status => match self.store.size().await {
                Ok(count) => format!("✅ slackrelay is up — {count} active session(s)."),
                Err(error) => {
                    warn!("session count failed: {error:#}");
                    ERROR_REPLY.to_string()
                }
            },
            Command::Reset => match self.store.remove(&event.channel, &root_ts).await {
                Ok(true) => {
                    "Session reset. The next message in this thread starts fresh.".to_string()
                }
                Ok(false) => "No active session for this thread.".to_string(),
                Err(error) => {
                    warn!("session reset failed: {error:#}");
                    ERROR_REPLY.to_string()
                }
            },
            Command::Info => match self.store.inspect(&event.channel, &root_ts).await {
                Ok(Some(session)) => format!(
                    "Session `{}` — last active {}.",
                    session.session_id,
                    session.last_activity.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                Ok(None) => "No session is stored for this thread.".to_string(),
                Err(error) => {
                    warn!("session inspect failed: {error:#}");
                    ERROR_REPLY.to_string()
                }
            },
            Command::Help => help_text(),
        };

        self.post_threaded(event, &reply).await;
    }

    /// Replace the placeholder when one exists, otherwise post fresh.
    async fn deliver(
        &self,
        event: &SlackEvent,
        root_ts: &str,
        placeholder: Option<PostedMessage>,
        text: &str,
    ) {
        let result = match &placeholder {
            Some(posted) => self.chat.update_message(&posted.channel, &posted.ts, text).await,
            None => self
                .chat
                .post_message(&event.channel, text, Some(root_ts))
                .await
                .map(|_| ()),
        };
        if let Err(error) = result {
            warn!(channel = %event.channel, "failed to deliver reply: {error:#}");
        }
    }

    async fn post_threaded(&self, event: &SlackEvent, text: &str) {
        if let Err(error) = self
            .chat
            .post_message(&event.channel, text, Some(event.root_ts()))
            .await
        {
            warn!(channel = %event.channel, "failed to post reply: {error:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use crate::relay::{RelayError, RelayReply};
    use crate::sessions::InMemorySessionStore;
    use crate::slack::SlackEventKind;

    struct FakeRelay {
        session_ids_seen: Mutex<Vec<Option<String>>>,
        replies: Mutex<VecDeque<Result<RelayReply, RelayError>>>,
    }

    impl FakeRelay {
        fn new() -> Self {
            Self {
                session_ids_seen: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
            }
        }

        fn queue_reply(&self, text: &str, session_id: Option<&str>) {
            self.replies.lock().push_back(Ok(RelayReply {
                text: text.to_string(),
                session_id: session_id.map(ToString::to_string),
            }));
        }

        fn queue_error(&self, status: u16, detail: &str) {
            self.replies.lock().push_back(Err(RelayError::Api {
                status,
                detail: detail.to_string(),
            }));
        }
    }

    #[async_trait]
    impl RelayProvider for FakeRelay {
        async fn send(
            &self,
            _message: &str,
            session_id: Option<&str>,
        ) -> Result<RelayReply, RelayError> {
            self.session_ids_seen
                .lock()
                .push(session_id.map(ToString::to_string));
            self.replies.lock().pop_front().unwrap_or_else(|| {
                Ok(RelayReply {
                    text: "default".to_string(),
                    session_id: None,
                })
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeChat {
        posts: Mutex<Vec<(String, String, Option<String>)>>,
        updates: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ChatTransport for FakeChat {
        async fn post_message(
            &self,
            channel: &str,
            text: &str,
            thread_ts: Option<&str>,
        ) -> Result<PostedMessage> {
            let mut posts = self.posts.lock();
            let ts = format!("ph-{}", posts.len());
            posts.push((
                channel.to_string(),
                text.to_string(),
                thread_ts.map(ToString::to_string),
            ));
            Ok(PostedMessage {
                channel: channel.to_string(),
                ts,
            })
        }

        async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()> {
            self.updates
                .lock()
                .push((channel.to_string(), ts.to_string(), text.to_string()));
            Ok(())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct Harness {
        store: Arc<InMemorySessionStore>,
        relay: Arc<FakeRelay>,
        chat: Arc<FakeChat>,
        router: EventRouter,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemorySessionStore::new(std::time::Duration::from_secs(
            24 * 60 * 60,
        )));
        let relay = Arc::new(FakeRelay::new());
        let chat = Arc::new(FakeChat::default());
        let router = EventRouter::new(
            store.clone() as Arc<dyn SessionStore>,
            relay.clone() as Arc<dyn RelayProvider>,
            chat.clone() as Arc<dyn ChatTransport>,
            "U0BOT",
        )
        .unwrap();
        Harness {
            store,
            relay,
            chat,
            router,
        }
    }

    fn dm(text: &str) -> SlackEvent {
        SlackEvent {
            kind: SlackEventKind::DirectMessage,
            channel: "D123".to_string(),
            user: "U123".to_string(),
            text: text.to_string(),
            ts: "1700000000.000100".to_string(),
            thread_ts: None,
        }
    }

    fn mention(text: &str) -> SlackEvent {
        SlackEvent {
            kind: SlackEventKind::AppMention,
            channel: "C123".to_string(),
            user: "U123".to_string(),
            text: text.to_string(),
            ts: "1700000000.000100".to_string(),
            thread_ts: None,
        }
    }

    fn threaded(event: SlackEvent, thread_ts: &str, ts: &str) -> SlackEvent {
        SlackEvent {
            thread_ts: Some(thread_ts.to_string()),
            ts: ts.to_string(),
            ..event
        }
    }

    #[tokio::test]
    async fn new_dm_records_session_and_replies() {
        let h = harness();
        h.relay.queue_reply("Hi", Some("abc"));

        h.router.handle_event(dm("Hello")).await;

        // Relay saw no session id on a fresh conversation
        assert_eq!(h.relay.session_ids_seen.lock().as_slice(), &[None]);

        // Store now holds the session keyed by the event's own timestamp
        let stored = h
            .store
            .inspect("D123", "1700000000.000100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.session_id, "abc");

        // Placeholder posted in-thread, then replaced with the answer
        let posts = h.chat.posts.lock();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, WORKING_REPLY);
        assert_eq!(posts[0].2.as_deref(), Some("1700000000.000100"));
        let updates = h.chat.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].2, "Hi");
    }

    #[tokio::test]
    async fn threaded_followup_reuses_session_without_new_record() {
        let h = harness();
        h.store.record("D123", "1700000000.000100", "abc").await.unwrap();
        h.relay.queue_reply("Again", Some("abc"));

        h.router
            .handle_event(threaded(dm("More"), "1700000000.000100", "1700000009.000500"))
            .await;

        assert_eq!(
            h.relay.session_ids_seen.lock().as_slice(),
            &[Some("abc".to_string())]
        );
        // No record for the follow-up message's own timestamp
        assert_eq!(h.store.size().await.unwrap(), 1);
        assert!(h
            .store
            .inspect("D123", "1700000009.000500")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn orphaned_thread_starts_fresh_without_recording() {
        let h = harness();
        h.relay.queue_reply("Fresh", Some("new-session"));

        h.router
            .handle_event(threaded(dm("Hello?"), "1690000000.000100", "1700000009.000500"))
            .await;

        assert_eq!(h.relay.session_ids_seen.lock().as_slice(), &[None]);
        // Threaded events never create a record, even when an id comes back
        assert_eq!(h.store.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_conversation_without_session_id_records_nothing() {
        let h = harness();
        h.relay.queue_reply("Hi", None);

        h.router.handle_event(dm("Hello")).await;

        assert_eq!(h.store.size().await.unwrap(), 0);
        assert_eq!(h.chat.updates.lock()[0].2, "Hi");
    }

    #[tokio::test]
    async fn relay_failure_sends_error_reply_and_leaves_store_unmodified() {
        let h = harness();
        h.relay.queue_error(500, "agent offline");

        h.router.handle_event(dm("Hello")).await;

        assert_eq!(h.store.size().await.unwrap(), 0);
        let updates = h.chat.updates.lock();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].2.contains("agent offline"));
    }

    #[tokio::test]
    async fn empty_mention_gets_greeting_instead_of_relay() {
        let h = harness();

        h.router.handle_event(mention("<@U0BOT>   ")).await;

        assert!(h.relay.session_ids_seen.lock().is_empty());
        let posts = h.chat.posts.lock();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, GREETING_REPLY);
    }

    #[tokio::test]
    async fn mention_marker_is_stripped_before_command_match() {
        let h = harness();

        h.router.handle_event(mention("<@U0BOT> status")).await;

        assert!(h.relay.session_ids_seen.lock().is_empty());
        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("0 active session(s)"));
    }

    #[tokio::test]
    async fn status_reports_session_count() {
        let h = harness();
        h.store.record("C123", "1700000000.000100", "abc").await.unwrap();
        h.store.record("C456", "1700000000.000200", "def").await.unwrap();

        h.router.handle_event(dm("status")).await;

        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("2 active session(s)"));
    }

    #[tokio::test]
    async fn reset_with_session_confirms_and_removes() {
        let h = harness();
        h.store.record("C123", "1700000000.000100", "abc").await.unwrap();

        h.router
            .handle_event(threaded(
                mention("<@U0BOT> reset"),
                "1700000000.000100",
                "1700000009.000500",
            ))
            .await;

        assert_eq!(h.store.size().await.unwrap(), 0);
        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("Session reset"));
    }

    #[tokio::test]
    async fn reset_without_session_reports_none_and_keeps_store() {
        let h = harness();
        h.store.record("C999", "1700000000.000100", "abc").await.unwrap();

        h.router.handle_event(mention("<@U0BOT> reset")).await;

        assert_eq!(h.store.size().await.unwrap(), 1);
        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("No active session"));
    }

    #[tokio::test]
    async fn info_reports_session_id_and_absence() {
        let h = harness();
        h.store.record("C123", "1700000000.000100", "abc").await.unwrap();

        h.router
            .handle_event(threaded(
                mention("<@U0BOT> info"),
                "1700000000.000100",
                "1700000009.000500",
            ))
            .await;
        h.router.handle_event(mention("<@U0BOT> info")).await;

        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("abc"));
        assert!(posts[1].1.contains("No session"));
    }

    #[tokio::test]
    async fn help_lists_commands_in_thread() {
        let h = harness();

        h.router.handle_event(dm("help")).await;

        let posts = h.chat.posts.lock();
        assert!(posts[0].1.contains("Available commands"));
        assert_eq!(posts[0].2.as_deref(), Some("1700000000.000100"));
    }
}

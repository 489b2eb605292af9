//! Slack platform surface: Web API client, Socket Mode runtime, and the
//! normalized event types the router consumes.

pub mod api_client;
pub mod events;
pub mod runtime;
pub mod traits;

pub use api_client::SlackApiClient;
pub use events::{normalize_event, parse_envelope, SlackEvent, SlackEventKind, SocketEnvelope};
pub use runtime::SocketModeRuntime;
pub use traits::{ChatTransport, PostedMessage};

//! Fixed utility commands handled without touching the relay.

/// A utility command matched against the cleaned message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness check; reports the current session count.
    Status,
    /// Drop the current thread's session.
    Reset,
    /// Report the current thread's stored session, if any.
    Info,
    /// List the available commands.
    Help,
}

impl Command {
    /// Match the cleaned (mention-stripped, trimmed) text against the
    /// fixed command set. Anything else goes to the relay.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "reset" => Some(Self::Reset),
            "info" => Some(Self::Info),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

pub fn help_text() -> String {
    [
        "Available commands:",
        "  status — check that the relay is up and count active sessions",
        "  reset — forget this thread's conversation and start fresh",
        "  info — show this thread's session id and last activity",
        "  help — show this message",
    ]
    .join("\n")
}

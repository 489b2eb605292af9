//! Relay subsystem for the remote conversational agent endpoint.
//!
//! [`RelayProvider`] is the seam the router talks through; [`HttpRelayClient`]
//! is the single production implementation. Error text coming back from the
//! remote service is scrubbed of secret-looking tokens and truncated before
//! it can reach logs or chat replies.

pub mod client;
pub mod traits;

pub use client::HttpRelayClient;
pub use traits::{RelayError, RelayProvider, RelayReply};

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from remote error strings.
///
/// Redacts tokens with prefixes like `sk-`, `xoxb-`, `xoxp-`, and `xapp-`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 4] = ["sk-", "xoxb-", "xoxp-", "xapp-"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize remote error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

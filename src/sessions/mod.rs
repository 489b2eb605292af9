//! Session management — tracks per-thread remote agent conversation state.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use traits::{SessionStore, ThreadKey, ThreadSession};

use std::sync::Arc;
use std::time::Duration;

/// Create the default in-memory session store with the given expiry threshold.
pub fn create_session_store(expiry: Duration) -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new(expiry))
}

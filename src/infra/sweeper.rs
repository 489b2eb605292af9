//! Periodic session-expiry sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::sessions::SessionStore;

/// Background task that evicts expired sessions for the lifetime of the
/// process. Constructed at startup, injected with the shared store, and
/// stopped through the shutdown flag rather than being dropped mid-sweep.
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SessionSweeper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            interval,
            shutdown,
        }
    }

    /// Tick until shutdown. The sweep itself never blocks event handling;
    /// it only takes the store lock for the duration of one eviction pass.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // interval() fires immediately; consume that so the first sweep
        // lands one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("session sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.store.sweep_expired().await {
                        Ok(removed) => info!(removed, "session sweep complete"),
                        Err(error) => warn!("session sweep failed: {error:#}"),
                    }
                }
            }
        }
    }
}

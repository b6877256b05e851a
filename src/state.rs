//! # Application State Management
//!
//! Shared state handed to every HTTP request handler and to each WebSocket
//! connection actor: the configuration, the connection registry, and the
//! handle to the inference dispatch queue.
//!
//! The registry carries its own synchronization and the dispatcher handle is
//! just a channel sender, so `AppState` clones are cheap and lock-free on
//! the hot path. Only the configuration sits behind a lock, and it is read
//! once per connection as a snapshot.

use crate::config::AppConfig;
use crate::inference::InferenceDispatcher;
use crate::session::ConnectionRegistry;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (snapshot reads via `get_config`).
    config: Arc<RwLock<AppConfig>>,

    /// Process-wide connection table with admission control.
    pub registry: Arc<ConnectionRegistry>,

    /// Handle to the inference dispatch queue.
    pub dispatcher: InferenceDispatcher,

    /// When the server started, for uptime reporting.
    start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<ConnectionRegistry>,
        dispatcher: InferenceDispatcher,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            dispatcher,
            start_time: Instant::now(),
        }
    }

    /// Snapshot of the current configuration. Clones so the lock is released
    /// immediately; `AppConfig` is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::NullRecognizer;

    #[tokio::test]
    async fn test_state_exposes_config_snapshot() {
        let config = AppConfig::default();
        let registry = Arc::new(ConnectionRegistry::new(config.websocket.max_connections));
        let dispatcher = InferenceDispatcher::start(
            Box::new(NullRecognizer),
            config.websocket.inference_queue_depth,
        );
        let state = AppState::new(config, registry, dispatcher);

        let snapshot = state.get_config();
        assert_eq!(snapshot.websocket.max_connections, 20);
        assert_eq!(state.registry.max_connections(), 20);
        assert!(state.registry.is_empty());
    }
}

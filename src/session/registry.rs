//! # Connection Registry
//!
//! Process-wide table of live sessions with admission control. The registry
//! is the single gate deciding whether a new connection may exist: the size
//! check and the insert happen under one lock guard, so no interleaving of
//! concurrent admission attempts can push the table past `max_connections`.
//!
//! ## Resource Management:
//! - `admit` assigns the session id and stores a close handle atomically
//! - `remove` is idempotent; both the normal-close and error paths call it
//! - `broadcast_close` empties the table at shutdown and asks every live
//!   connection to close, without waiting for client acknowledgment

use crate::error::AdmissionError;
use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Request sent to a connection actor asking it to close its socket.
///
/// Delivery is fire-and-forget: the registry never waits for the actor to
/// acknowledge, it only guarantees the table entry is gone.
#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseSession {
    /// Human-readable reason included in the close frame.
    pub reason: String,
}

/// Process-wide map from session id to a close handle for that connection.
///
/// ## Invariant:
/// `len() <= max_connections` at all times. An admission attempt that would
/// violate this fails before any session object is created.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Recipient<CloseSession>>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            max_connections,
        }
    }

    /// Admit a new connection, assigning it a unique session id.
    ///
    /// The capacity comparison and the insert share one lock guard: two
    /// concurrent admits can never both succeed past the limit.
    ///
    /// ## Returns:
    /// - **Ok(session_id)**: entry inserted, connection may proceed
    /// - **Err(ConnectionsFull)**: table at capacity, nothing was created
    pub fn admit(&self, closer: Recipient<CloseSession>) -> Result<String, AdmissionError> {
        let mut connections = self.connections.lock().unwrap();

        if connections.len() >= self.max_connections {
            return Err(AdmissionError::ConnectionsFull {
                max_connections: self.max_connections,
            });
        }

        let session_id = Uuid::new_v4().to_string();
        connections.insert(session_id.clone(), closer);
        Ok(session_id)
    }

    /// Remove a session. Removing an id that is already gone is a no-op,
    /// because the close path and the error path may both attempt cleanup.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut connections = self.connections.lock().unwrap();
        connections.remove(session_id).is_some()
    }

    /// Ask every live connection to close and empty the table.
    ///
    /// Used at graceful shutdown. The close requests are fire-and-forget; a
    /// connection actor that already stopped simply drops the message.
    pub fn broadcast_close(&self, reason: &str) -> usize {
        let drained: Vec<(String, Recipient<CloseSession>)> = {
            let mut connections = self.connections.lock().unwrap();
            connections.drain().collect()
        };

        let count = drained.len();
        for (session_id, closer) in drained {
            tracing::info!("requesting close of session {}", session_id);
            closer.do_send(CloseSession {
                reason: reason.to_string(),
            });
        }
        count
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Minimal actor standing in for a connection when testing the registry.
    struct DummyConnection;

    impl Actor for DummyConnection {
        type Context = Context<Self>;
    }

    impl Handler<CloseSession> for DummyConnection {
        type Result = ();
        fn handle(&mut self, _msg: CloseSession, _ctx: &mut Context<Self>) {}
    }

    #[actix_web::test]
    async fn test_admission_respects_limit() {
        let registry = ConnectionRegistry::new(2);
        let closer = DummyConnection.start().recipient::<CloseSession>();

        let first = registry.admit(closer.clone()).unwrap();
        let second = registry.admit(closer.clone()).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        // The (max+1)-th attempt is rejected and creates nothing.
        let rejected = registry.admit(closer.clone());
        assert_eq!(
            rejected.unwrap_err(),
            AdmissionError::ConnectionsFull { max_connections: 2 }
        );
        assert_eq!(registry.len(), 2);

        // Freeing a slot lets the next attempt in.
        assert!(registry.remove(&first));
        assert!(registry.admit(closer).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[actix_web::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new(4);
        let closer = DummyConnection.start().recipient::<CloseSession>();

        let id = registry.admit(closer).unwrap();
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(!registry.remove("never-existed"));
        assert!(registry.is_empty());
    }

    #[actix_web::test]
    async fn test_concurrent_admission_never_overshoots() {
        let registry = Arc::new(ConnectionRegistry::new(20));
        let closer = DummyConnection.start().recipient::<CloseSession>();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let closer = closer.clone();
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0;
                for _ in 0..10 {
                    if registry.admit(closer.clone()).is_ok() {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 20);
        assert_eq!(registry.len(), 20);
    }

    #[actix_web::test]
    async fn test_broadcast_close_empties_registry() {
        let registry = ConnectionRegistry::new(8);
        let closer = DummyConnection.start().recipient::<CloseSession>();

        for _ in 0..3 {
            registry.admit(closer.clone()).unwrap();
        }
        assert_eq!(registry.broadcast_close("shutting down"), 3);
        assert!(registry.is_empty());

        // Broadcasting with nothing registered is harmless.
        assert_eq!(registry.broadcast_close("shutting down"), 0);
    }
}

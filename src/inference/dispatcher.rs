//! # Inference Dispatch Queue
//!
//! Serializes access to the single shared recognition resource across any
//! number of concurrent sessions while keeping per-session socket I/O
//! non-blocking.
//!
//! ## Structure:
//! - A **bounded mpsc channel** holds pending work items in FIFO order
//!   across sessions. `submit` uses `try_send`: a full queue fails fast with
//!   `InferenceError::Overloaded` instead of growing unbounded. This is the
//!   system's backpressure mechanism: recognition is CPU-bound and can fall
//!   behind the audio arrival rate under load.
//! - A **single worker** (spawned onto the blocking pool) owns the
//!   `Box<dyn Recognizer>` exclusively and drains the channel one item at a
//!   time. At most one call is ever inside the backend, enforced by
//!   structure rather than by locks scattered across session handlers.
//! - Each work item carries a **oneshot responder**. Results go back to the
//!   originating session only; the queue never touches a socket. If the
//!   session disconnected while its item was queued or running, the
//!   receiver is gone and the completed result is silently discarded.
//!
//! FIFO admission plus a single worker gives per-session ordering for free:
//! a session's responses arrive in the order its items were submitted.

use crate::error::InferenceError;
use crate::inference::engine::{Recognition, Recognizer};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One unit of recognition work. Owned by the queue from submission until a
/// result or failure is produced; the submitting session keeps nothing.
struct WorkItem {
    session_id: String,
    samples: Vec<f32>,
    enqueued_at: Instant,
    responder: oneshot::Sender<Result<Recognition, InferenceError>>,
}

/// Cheap-to-clone handle to the dispatch queue. One per connection actor.
#[derive(Clone)]
pub struct InferenceDispatcher {
    tx: mpsc::Sender<WorkItem>,
}

impl InferenceDispatcher {
    /// Start the worker and return a submission handle.
    ///
    /// Must be called inside a tokio runtime. The worker runs until every
    /// handle is dropped, then drains and exits.
    pub fn start(recognizer: Box<dyn Recognizer>, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);
        info!(
            "inference dispatcher starting (backend: {}, queue depth: {})",
            recognizer.name(),
            queue_depth
        );
        tokio::task::spawn_blocking(move || worker_loop(recognizer, rx));
        Self { tx }
    }

    /// Submit samples for recognition on behalf of a session.
    ///
    /// Non-blocking: the admission decision is immediate. Execution happens
    /// later on the worker; the returned receiver resolves with the result.
    ///
    /// ## Returns:
    /// - **Ok(receiver)**: item queued; await the receiver for the outcome
    /// - **Err(Overloaded)**: queue at capacity, item rejected (backpressure)
    /// - **Err(WorkerGone)**: dispatcher shut down
    pub fn submit(
        &self,
        session_id: String,
        samples: Vec<f32>,
    ) -> Result<oneshot::Receiver<Result<Recognition, InferenceError>>, InferenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let item = WorkItem {
            session_id,
            samples,
            enqueued_at: Instant::now(),
            responder: reply_tx,
        };

        self.tx.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => InferenceError::Overloaded,
            mpsc::error::TrySendError::Closed(_) => InferenceError::WorkerGone,
        })?;

        Ok(reply_rx)
    }
}

/// Worker loop: exclusive owner of the recognizer, one item at a time.
fn worker_loop(mut recognizer: Box<dyn Recognizer>, mut rx: mpsc::Receiver<WorkItem>) {
    while let Some(item) = rx.blocking_recv() {
        let queue_wait_ms = item.enqueued_at.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "[{}] recognizing {} samples (queued {:.1}ms)",
            item.session_id,
            item.samples.len(),
            queue_wait_ms
        );

        let started = Instant::now();
        let outcome = match recognizer.recognize(&item.samples) {
            Ok(hypotheses) => Ok(Recognition::from_hypotheses(hypotheses, started)),
            Err(err) => {
                warn!("[{}] recognition failed: {}", item.session_id, err);
                Err(InferenceError::Resource(err.to_string()))
            }
        };

        // A dropped receiver means the session disconnected; the inference
        // was already committed, the result is simply discarded.
        if item.responder.send(outcome).is_err() {
            debug!(
                "[{}] session gone, discarding recognition result",
                item.session_id
            );
        }
    }
    info!("inference dispatcher worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::engine::Hypothesis;
    use std::sync::mpsc as std_mpsc;
    use std::sync::{Arc, Mutex};

    /// Test backend that replays scripted hypotheses in submission order.
    struct ScriptedRecognizer {
        counter: u64,
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize(&mut self, _samples: &[f32]) -> anyhow::Result<Vec<Hypothesis>> {
            self.counter += 1;
            Ok(vec![Hypothesis {
                text: format!("utterance {}", self.counter),
            }])
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Test backend that blocks inside `recognize` until released, so tests
    /// can fill the queue deterministically.
    struct GatedRecognizer {
        started_tx: std_mpsc::Sender<()>,
        release_rx: Arc<Mutex<std_mpsc::Receiver<()>>>,
    }

    impl Recognizer for GatedRecognizer {
        fn recognize(&mut self, _samples: &[f32]) -> anyhow::Result<Vec<Hypothesis>> {
            self.started_tx.send(()).unwrap();
            self.release_rx.lock().unwrap().recv().unwrap();
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&mut self, _samples: &[f32]) -> anyhow::Result<Vec<Hypothesis>> {
            Err(anyhow::anyhow!("model state corrupted"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_come_back_in_submission_order() {
        let dispatcher = InferenceDispatcher::start(Box::new(ScriptedRecognizer { counter: 0 }), 8);

        let receivers: Vec<_> = (0..4)
            .map(|_| {
                dispatcher
                    .submit("s1".to_string(), vec![0.0f32; 160])
                    .unwrap()
            })
            .collect();

        for (i, rx) in receivers.into_iter().enumerate() {
            let recognition = rx.await.unwrap().unwrap();
            assert_eq!(recognition.text, format!("utterance {}", i + 1));
            assert_eq!(recognition.confidence, crate::inference::engine::DEFAULT_CONFIDENCE);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_rejects_with_overloaded() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let recognizer = GatedRecognizer {
            started_tx,
            release_rx: Arc::new(Mutex::new(release_rx)),
        };
        let dispatcher = InferenceDispatcher::start(Box::new(recognizer), 1);

        // First item is picked up by the worker and blocks inside recognize.
        let first = dispatcher.submit("s1".to_string(), vec![0.0; 16]).unwrap();
        started_rx.recv().unwrap();

        // Second item fills the single queue slot; third must fail fast.
        let second = dispatcher.submit("s1".to_string(), vec![0.0; 16]).unwrap();
        let third = dispatcher.submit("s1".to_string(), vec![0.0; 16]);
        assert!(matches!(third, Err(InferenceError::Overloaded)));

        // Release both queued items; the pipeline recovers.
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        let again = dispatcher.submit("s1".to_string(), vec![0.0; 16]).unwrap();
        started_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        assert!(again.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_receiver_discards_result_without_disruption() {
        let dispatcher = InferenceDispatcher::start(Box::new(ScriptedRecognizer { counter: 0 }), 8);

        // Session disconnects before its result arrives.
        let orphaned = dispatcher
            .submit("gone".to_string(), vec![0.0f32; 160])
            .unwrap();
        drop(orphaned);

        // A later submission from a live session is unaffected.
        let live = dispatcher
            .submit("live".to_string(), vec![0.0f32; 160])
            .unwrap();
        let recognition = live.await.unwrap().unwrap();
        assert!(!recognition.text.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backend_failure_surfaces_as_resource_error() {
        let dispatcher = InferenceDispatcher::start(Box::new(FailingRecognizer), 4);
        let rx = dispatcher.submit("s1".to_string(), vec![0.0; 16]).unwrap();

        match rx.await.unwrap() {
            Err(InferenceError::Resource(msg)) => assert!(msg.contains("model state corrupted")),
            other => panic!("expected Resource error, got {:?}", other.map(|r| r.text)),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_null_backend_yields_empty_text() {
        let dispatcher =
            InferenceDispatcher::start(Box::new(crate::inference::engine::NullRecognizer), 4);
        let rx = dispatcher
            .submit("s1".to_string(), vec![0.0f32; 16000])
            .unwrap();

        let recognition = rx.await.unwrap().unwrap();
        assert!(recognition.text.is_empty());
        assert_eq!(recognition.confidence, 0.0);
    }
}

//! # Inference Module
//!
//! Serialized access to the shared speech-recognition resource.
//!
//! ## Key Components:
//! - **Recognizer trait**: the boundary to the external recognition backend
//!   (blocking, non-reentrant, opaque to the rest of the server)
//! - **Dispatch queue**: a bounded serialization point that lets many
//!   concurrent sessions share one recognizer without blocking each other's
//!   socket I/O
//!
//! The recognizer is CPU-bound and not safe for concurrent invocation, so
//! exactly one call may be in flight at any time. That property is enforced
//! structurally here: a single worker owns the recognizer, and everything
//! else only ever talks to the queue.

pub mod dispatcher;
pub mod engine;

pub use dispatcher::InferenceDispatcher;
pub use engine::{Hypothesis, NullRecognizer, Recognition, Recognizer};

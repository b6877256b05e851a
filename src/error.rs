//! # Error Handling
//!
//! Failure taxonomy for the streaming transcription server. Every fallible
//! boundary in the pipeline returns one of these tagged values instead of
//! panicking or bubbling an opaque error past the protocol layer:
//!
//! - **DecodeError**: audio payload could not be turned into samples
//! - **InferenceError**: the dispatch queue or recognition backend failed
//! - **ProtocolError**: an inbound frame violated the message grammar
//! - **AdmissionError**: a connection attempt was rejected at the gate
//!
//! Decode, protocol, and inference failures are recovered per-message: the
//! session reports a structured `error` frame and keeps its read loop alive.
//! Admission failures happen before a session exists, so they close the
//! socket instead. See `websocket.rs` for the mapping onto wire codes.

use std::fmt;

/// Audio payload decoding failures (see `audio::decoder`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Encoded payload exceeds the configured ceiling. Checked against the
    /// encoded length before any decoding work happens.
    TooLarge { encoded_len: usize, max_len: usize },

    /// Payload is not valid base64, or decodes to an odd byte count that
    /// cannot be 16-bit PCM.
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooLarge { encoded_len, max_len } => write!(
                f,
                "audio payload too large: {} bytes encoded (limit {})",
                encoded_len, max_len
            ),
            DecodeError::Malformed(msg) => write!(f, "malformed audio payload: {}", msg),
        }
    }
}

/// Failures on the inference path (see `inference::dispatcher`).
#[derive(Debug)]
pub enum InferenceError {
    /// The pending-work queue is at capacity. This is the backpressure
    /// signal: the caller must not retry blindly.
    Overloaded,

    /// The recognition backend itself failed.
    Resource(String),

    /// The dispatcher worker is gone (process shutting down).
    WorkerGone,
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::Overloaded => {
                write!(f, "inference queue full, audio chunk rejected")
            }
            InferenceError::Resource(msg) => write!(f, "recognition failed: {}", msg),
            InferenceError::WorkerGone => write!(f, "inference worker unavailable"),
        }
    }
}

/// Inbound frame violations (see `websocket.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame was not valid JSON or lacked required fields.
    MalformedMessage(String),

    /// The `type` discriminator was present but unrecognized.
    UnknownType(String),

    /// A `control` frame carried a command outside start/stop/reset.
    UnknownCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedMessage(msg) => write!(f, "malformed message: {}", msg),
            ProtocolError::UnknownType(t) => write!(f, "unknown message type: {}", t),
            ProtocolError::UnknownCommand(c) => write!(f, "unknown control command: {}", c),
        }
    }
}

/// Connection admission failures (see `session::registry`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The registry is at `max_connections`; the attempt is rejected before
    /// any session object is created.
    ConnectionsFull { max_connections: usize },
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::ConnectionsFull { max_connections } => write!(
                f,
                "server at capacity ({} connections), try again later",
                max_connections
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_reports_sizes() {
        let err = DecodeError::TooLarge {
            encoded_len: 2_000_000,
            max_len: 1_048_576,
        };
        let msg = err.to_string();
        assert!(msg.contains("2000000"));
        assert!(msg.contains("1048576"));
    }

    #[test]
    fn admission_error_names_the_limit() {
        let err = AdmissionError::ConnectionsFull { max_connections: 20 };
        assert!(err.to_string().contains("20"));
    }
}

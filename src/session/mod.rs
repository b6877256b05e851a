//! # Session Management
//!
//! Per-connection push-to-talk state and process-wide connection tracking.
//!
//! ## Key Components:
//! - **PttSession**: one per live connection; tracks the recording state
//!   machine (Idle/Recording) and per-session counters
//! - **ConnectionRegistry**: process-wide table of live sessions with
//!   admission control (see `registry`)
//!
//! ## Session Lifecycle:
//! 1. **Admitted**: registry accepted the connection, session created
//! 2. **Idle**: connected, audio is discarded (counted, not reported)
//! 3. **Recording**: clients pressed the talk button, audio flows to inference
//! 4. **Destroyed**: socket closed, session removed from the registry
//!
//! Session state and stats are mutated only by the owning connection's actor,
//! so neither needs locking.

pub mod registry;

pub use registry::{CloseSession, ConnectionRegistry};

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Push-to-talk recording state for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttState {
    /// Connected, not recording. Audio arriving here is silently discarded.
    Idle,
    /// Talk button held; audio is forwarded to the inference queue.
    Recording,
}

impl PttState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PttState::Idle => "idle",
            PttState::Recording => "recording",
        }
    }
}

/// Control commands recognized by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Reset,
}

impl ControlCommand {
    /// Parse a wire command string. Anything outside start/stop/reset is an
    /// `UnknownCommand` protocol error; the state machine stays unchanged.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        match raw {
            "start" => Ok(ControlCommand::Start),
            "stop" => Ok(ControlCommand::Stop),
            "reset" => Ok(ControlCommand::Reset),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Counters for one session, mutated only by the owning actor.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Wall-clock connection time, for the disconnect summary.
    pub connected_at: DateTime<Utc>,
    /// Monotonic start, for duration arithmetic.
    pub started: Instant,
    /// Audio chunks decoded and accepted while recording.
    pub audio_chunks: u64,
    /// Non-empty recognition results delivered to the client.
    pub recognitions: u64,
    /// Per-message failures reported to the client (decode, size, inference).
    pub errors: u64,
    /// Audio chunks discarded because the session was idle.
    pub discarded_idle: u64,
    /// Audio chunks discarded because a prior result was still in flight.
    pub discarded_inflight: u64,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            connected_at: Utc::now(),
            started: Instant::now(),
            audio_chunks: 0,
            recognitions: 0,
            errors: 0,
            discarded_idle: 0,
            discarded_inflight: 0,
        }
    }

    /// Seconds since the session connected.
    pub fn duration_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// What the router should do with a decoded audio chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDisposition {
    /// Recording and no result outstanding: forward to the dispatch queue.
    Submit,
    /// Session is idle; chunk dropped and counted.
    DroppedIdle,
    /// A prior result is still in flight; chunk dropped and counted.
    DroppedInflight,
}

/// Per-connection push-to-talk session.
///
/// Owned exclusively by the connection's actor; every method takes `&mut
/// self` or `&self` without interior locking.
#[derive(Debug)]
pub struct PttSession {
    id: String,
    state: PttState,
    stats: SessionStats,
}

impl PttSession {
    /// Create a session in the initial `Idle` state.
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: PttState::Idle,
            stats: SessionStats::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PttState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == PttState::Recording
    }

    /// Apply a control command and return the status message to send back.
    ///
    /// ## Transitions:
    /// | Command | From | To        |
    /// |---------|------|-----------|
    /// | start   | any  | Recording |
    /// | stop    | any  | Idle      |
    /// | reset   | any  | Idle      |
    ///
    /// Every valid command succeeds from every state; `start` and `reset`
    /// also discard any partial audio (nothing is ever buffered under the
    /// drop-while-in-flight policy, so the discard is a state-only effect).
    /// Unknown commands leave the state untouched and surface as a protocol
    /// error for the router to report.
    pub fn apply_control(&mut self, raw_command: &str) -> Result<&'static str, ProtocolError> {
        let command = ControlCommand::parse(raw_command)?;
        match command {
            ControlCommand::Start => {
                self.state = PttState::Recording;
                Ok("recording started")
            }
            ControlCommand::Stop => {
                self.state = PttState::Idle;
                Ok("recording stopped")
            }
            ControlCommand::Reset => {
                self.state = PttState::Idle;
                Ok("reset")
            }
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Decide what to do with a decoded audio chunk and keep the counters.
    ///
    /// At most one WorkItem may be in flight per session; while
    /// `result_in_flight` is true further chunks are dropped and counted,
    /// as is any chunk arriving outside a recording interval. Only `Submit`
    /// counts toward `audio_chunks`.
    pub fn admit_audio(&mut self, result_in_flight: bool) -> AudioDisposition {
        if !self.is_recording() {
            self.stats.discarded_idle += 1;
            return AudioDisposition::DroppedIdle;
        }
        if result_in_flight {
            self.stats.discarded_inflight += 1;
            return AudioDisposition::DroppedInflight;
        }
        self.stats.audio_chunks += 1;
        AudioDisposition::Submit
    }

    pub fn note_recognition(&mut self) {
        self.stats.recognitions += 1;
    }

    pub fn note_error(&mut self) {
        self.stats.errors += 1;
    }

}

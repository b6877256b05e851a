//! # WebSocket Session Handler
//!
//! Per-connection protocol router for push-to-talk transcription. Clients
//! connect to `/ws/asr`, toggle recording with control commands, stream
//! base64 PCM audio chunks while recording, and receive incremental
//! transcription results.
//!
//! ## WebSocket Protocol:
//! - **Client → Server**: `{"type":"control","command":"start|stop|reset"}`
//!   and `{"type":"audio","data":"<base64 PCM16 mono 16kHz>"}`
//! - **Server → Client**: `status` (code 200), `result` (partial text), and
//!   `error` (400/413/500) frames, all carrying epoch-millis timestamps
//!
//! ## Actor Model:
//! Each connection is an independent Actix actor. Admission control runs in
//! `started()`: a rejected connection receives a policy-violation close
//! frame and nothing else. Teardown runs in `stopped()` and is the same for
//! every exit path (normal close, protocol error, unexpected failure), so
//! no session can outlive its socket or leak a registry entry.

use crate::audio::decode_audio;
use crate::error::{DecodeError, InferenceError, ProtocolError};
use crate::inference::{InferenceDispatcher, Recognition};
use crate::session::{AudioDisposition, CloseSession, ConnectionRegistry, PttSession};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Payload of an inbound `control` frame.
#[derive(Debug, Deserialize)]
struct ControlFrame {
    command: String,
}

/// Payload of an inbound `audio` frame.
#[derive(Debug, Deserialize)]
struct AudioFrame {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    timestamp: Option<u64>,
}

/// Outbound message shapes.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Status {
        code: u16,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        connection_id: Option<String>,
        timestamp: u64,
    },
    Result {
        mode: &'static str,
        text: String,
        timestamp: u64,
        confidence: f32,
        processing_time_ms: f64,
    },
    Error {
        code: u16,
        message: String,
        timestamp: u64,
    },
}

/// Current time as epoch milliseconds, the protocol's timestamp format.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Internal message delivering a recognition outcome back to the actor.
#[derive(Message)]
#[rtype(result = "()")]
struct RecognitionOutcome {
    outcome: Result<Recognition, InferenceError>,
    /// Client timestamp of the originating audio chunk, echoed in results.
    client_timestamp: u64,
}

/// WebSocket actor for one push-to-talk session.
pub struct AsrWebSocket {
    /// Session state; `None` until admission succeeds.
    session: Option<PttSession>,

    /// Process-wide connection table.
    registry: Arc<ConnectionRegistry>,

    /// Handle to the inference dispatch queue.
    dispatcher: InferenceDispatcher,

    /// Ceiling on the encoded length of one audio payload.
    max_audio_size: usize,

    /// Connections with no inbound activity for this long are closed.
    idle_timeout: Duration,

    /// Last inbound activity, updated on every frame.
    last_activity: Instant,

    /// Whether this session has a recognition result outstanding. Audio
    /// arriving while true is dropped and counted (one WorkItem per session
    /// in flight at a time keeps per-session ordering trivial).
    inflight: bool,
}

impl AsrWebSocket {
    pub fn new(state: &AppState) -> Self {
        let config = state.get_config();
        Self {
            session: None,
            registry: state.registry.clone(),
            dispatcher: state.dispatcher.clone(),
            max_audio_size: config.websocket.max_audio_size,
            idle_timeout: Duration::from_secs(config.websocket.idle_timeout_secs),
            last_activity: Instant::now(),
            inflight: false,
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("failed to serialize outbound message: {}", err),
        }
    }

    fn send_status(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        self.send(
            ctx,
            &ServerMessage::Status {
                code: 200,
                message: message.to_string(),
                connection_id: None,
                timestamp: now_millis(),
            },
        );
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: u16, message: String) {
        warn!(
            "[{}] error {}: {}",
            self.session.as_ref().map(|s| s.id()).unwrap_or("-"),
            code,
            message
        );
        self.send(
            ctx,
            &ServerMessage::Error {
                code,
                message,
                timestamp: now_millis(),
            },
        );
    }

    /// Route one inbound text frame. Parse failures are per-message errors;
    /// the read loop always continues.
    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                let failure = ProtocolError::MalformedMessage(err.to_string());
                self.send_error(ctx, 400, failure.to_string());
                return;
            }
        };

        match value.get("type").and_then(|t| t.as_str()) {
            Some("control") => match serde_json::from_value::<ControlFrame>(value.clone()) {
                Ok(frame) => self.handle_control(&frame.command, ctx),
                Err(err) => {
                    let failure = ProtocolError::MalformedMessage(err.to_string());
                    self.send_error(ctx, 400, failure.to_string());
                }
            },
            Some("audio") => match serde_json::from_value::<AudioFrame>(value.clone()) {
                Ok(frame) => self.handle_audio(frame, ctx),
                Err(err) => {
                    let failure = ProtocolError::MalformedMessage(err.to_string());
                    self.send_error(ctx, 400, failure.to_string());
                }
            },
            Some(other) => {
                let failure = ProtocolError::UnknownType(other.to_string());
                self.send_error(ctx, 400, failure.to_string());
            }
            None => {
                let failure =
                    ProtocolError::MalformedMessage("missing `type` discriminator".to_string());
                self.send_error(ctx, 400, failure.to_string());
            }
        }
    }

    /// Drive the state machine with a control command.
    fn handle_control(&mut self, command: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.apply_control(command) {
            Ok(status_message) => {
                info!(
                    "[{}] control `{}` -> {}",
                    session.id(),
                    command,
                    session.state().as_str()
                );
                self.send_status(ctx, status_message);
            }
            Err(failure) => {
                self.send_error(ctx, 400, failure.to_string());
            }
        }
    }

    /// Route one audio frame through the decoder and into the dispatch queue.
    fn handle_audio(&mut self, frame: AudioFrame, ctx: &mut ws::WebsocketContext<Self>) {
        if self.session.is_none() {
            return;
        }

        let data = match frame.data {
            Some(data) if !data.is_empty() => data,
            _ => {
                warn!("empty audio payload, ignoring");
                return;
            }
        };

        // Size ceiling applies to the encoded payload, before the decoder
        // ever runs.
        let samples = match decode_audio(&data, self.max_audio_size) {
            Ok(samples) => samples,
            Err(failure @ DecodeError::TooLarge { .. }) => {
                if let Some(session) = self.session.as_mut() {
                    session.note_error();
                }
                self.send_error(ctx, 413, failure.to_string());
                return;
            }
            Err(failure @ DecodeError::Malformed(_)) => {
                if let Some(session) = self.session.as_mut() {
                    session.note_error();
                }
                self.send_error(ctx, 400, failure.to_string());
                return;
            }
        };

        if samples.is_empty() {
            debug!("audio payload decoded to zero samples, ignoring");
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        // Valid audio outside a recording interval is a normal part of PTT
        // release timing, and at most one WorkItem may be in flight per
        // session; both cases drop the chunk with a counter.
        match session.admit_audio(self.inflight) {
            AudioDisposition::DroppedIdle => {
                debug!("[{}] audio while idle, discarded", session.id());
                return;
            }
            AudioDisposition::DroppedInflight => {
                debug!(
                    "[{}] recognition in flight, dropping audio chunk",
                    session.id()
                );
                return;
            }
            AudioDisposition::Submit => {}
        }

        let session_id = session.id().to_string();
        let client_timestamp = frame.timestamp.unwrap_or_else(now_millis);

        match self.dispatcher.submit(session_id, samples) {
            Ok(receiver) => {
                self.inflight = true;
                let addr = ctx.address();
                tokio::spawn(async move {
                    let outcome = match receiver.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(InferenceError::WorkerGone),
                    };
                    // do_send to a stopped actor is a no-op, which is
                    // exactly the discard semantics for late results.
                    addr.do_send(RecognitionOutcome {
                        outcome,
                        client_timestamp,
                    });
                });
            }
            Err(failure) => {
                session.note_error();
                self.send_error(ctx, 500, failure.to_string());
            }
        }
    }
}

impl Actor for AsrWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Admission happens here, before any message exchange. Rejected
    /// connections get a policy close frame and nothing else.
    fn started(&mut self, ctx: &mut Self::Context) {
        let closer = ctx.address().recipient::<CloseSession>();

        match self.registry.admit(closer) {
            Ok(session_id) => {
                info!(
                    "session {} connected ({}/{} connections)",
                    session_id,
                    self.registry.len(),
                    self.registry.max_connections()
                );

                self.send(
                    ctx,
                    &ServerMessage::Status {
                        code: 200,
                        message: "connected, recognizer ready".to_string(),
                        connection_id: Some(session_id.clone()),
                        timestamp: now_millis(),
                    },
                );
                self.session = Some(PttSession::new(session_id));

                // Idle sweep: close connections with no inbound activity.
                let check_every =
                    Duration::from_secs((self.idle_timeout.as_secs() / 10).clamp(1, 30));
                ctx.run_interval(check_every, |act, ctx| {
                    if act.last_activity.elapsed() > act.idle_timeout {
                        info!(
                            "[{}] idle timeout, closing",
                            act.session.as_ref().map(|s| s.id()).unwrap_or("-")
                        );
                        ctx.close(Some(ws::CloseReason {
                            code: ws::CloseCode::Normal,
                            description: Some("idle timeout".to_string()),
                        }));
                        ctx.stop();
                    }
                });
            }
            Err(rejection) => {
                warn!("connection rejected: {}", rejection);
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some(rejection.to_string()),
                }));
                ctx.stop();
            }
        }
    }

    /// Unconditional teardown, identical for every exit path.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session) = self.session.take() {
            // remove() is idempotent; broadcast_close may already have
            // drained this entry.
            self.registry.remove(session.id());

            let stats = session.stats();
            info!(
                "session {} disconnected | connected: {} | duration: {:.2}s | chunks: {} | \
                 recognitions: {} | errors: {} | discarded idle/inflight: {}/{} | \
                 {} connections remain",
                session.id(),
                stats.connected_at.to_rfc3339(),
                stats.duration_seconds(),
                stats.audio_chunks,
                stats.recognitions,
                stats.errors,
                stats.discarded_idle,
                stats.discarded_inflight,
                self.registry.len()
            );
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AsrWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_activity = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_activity = Instant::now();
                self.send_error(
                    ctx,
                    400,
                    "binary frames not supported, send JSON text".to_string(),
                );
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_activity = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_activity = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!("client closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                // Transport-level failure. Report best-effort, then tear
                // down through the normal stop path.
                error!("websocket protocol error: {}", err);
                self.send_error(ctx, 500, format!("server error: {}", err));
                ctx.stop();
            }
        }
    }
}

impl Handler<RecognitionOutcome> for AsrWebSocket {
    type Result = ();

    fn handle(&mut self, msg: RecognitionOutcome, ctx: &mut Self::Context) {
        self.inflight = false;

        let Some(session) = self.session.as_mut() else {
            return;
        };

        match msg.outcome {
            Ok(recognition) if !recognition.text.trim().is_empty() => {
                session.note_recognition();
                info!(
                    "[{}] recognized: {} ({:.2}ms)",
                    session.id(),
                    recognition.text,
                    recognition.processing_time_ms
                );
                self.send(
                    ctx,
                    &ServerMessage::Result {
                        mode: "partial",
                        text: recognition.text,
                        timestamp: msg.client_timestamp,
                        confidence: recognition.confidence,
                        processing_time_ms: recognition.processing_time_ms,
                    },
                );
            }
            Ok(_) => {
                debug!("[{}] empty recognition result", session.id());
            }
            Err(failure) => {
                session.note_error();
                self.send_error(ctx, 500, failure.to_string());
            }
        }
    }
}

impl Handler<CloseSession> for AsrWebSocket {
    type Result = ();

    fn handle(&mut self, msg: CloseSession, ctx: &mut Self::Context) {
        info!(
            "[{}] close requested: {}",
            self.session.as_ref().map(|s| s.id()).unwrap_or("-"),
            msg.reason
        );
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some(msg.reason),
        }));
        ctx.stop();
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh `AsrWebSocket` actor.
pub async fn asr_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!(
        "websocket connection request from {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(AsrWebSocket::new(app_state.get_ref()), &req, stream)
}

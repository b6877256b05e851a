//! # Audio Module
//!
//! Decoding of inbound audio payloads for the transcription pipeline.
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: base64 text over the WebSocket, little-endian signed
//!   integers underneath
//!
//! The decoder is a pure function: no shared state, safe to call from any
//! number of sessions concurrently.

pub mod decoder;

pub use decoder::decode_audio;

//! # Recognition Backend Boundary
//!
//! The `Recognizer` trait is the seam between this server and the speech
//! model. The server treats the call as opaque, synchronous, and unsafe for
//! concurrent invocation; model loading, warm-up, and device placement all
//! live behind the trait on the implementation's side.
//!
//! `NullRecognizer` is the default wiring: it recognizes nothing, which lets
//! the server run end to end (and the tests exercise the whole pipeline)
//! without a model present. Real backends implement `Recognizer` and replace
//! it in `main`.

use anyhow::Result;
use std::time::Instant;

/// Confidence reported for non-empty recognition text. The backend interface
/// does not expose a calibrated score, so a fixed value is used.
pub const DEFAULT_CONFIDENCE: f32 = 0.95;

/// One candidate transcription from the backend.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub text: String,
}

/// Blocking, non-reentrant speech recognition backend.
///
/// Implementations may hold whatever mutable decoder state they need;
/// the dispatch queue guarantees exactly one caller at a time.
pub trait Recognizer: Send {
    /// Transcribe normalized f32 samples (16 kHz mono, [-1.0, 1.0]).
    ///
    /// An empty hypothesis list (or an empty/whitespace first hypothesis)
    /// means "nothing recognized" and is not an error.
    fn recognize(&mut self, samples: &[f32]) -> Result<Vec<Hypothesis>>;

    /// Short backend identifier for logs and the stats endpoint.
    fn name(&self) -> &str;
}

/// Backend stand-in that recognizes nothing. Keeps the server runnable when
/// no model backend has been wired in.
#[derive(Debug, Default)]
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn recognize(&mut self, _samples: &[f32]) -> Result<Vec<Hypothesis>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Result of one recognition call, as routed back to the session.
/// Ephemeral: delivered to the client or discarded, never persisted.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Recognized text; may be empty (silence is not an error).
    pub text: String,
    /// Confidence in [0.0, 1.0].
    pub confidence: f32,
    /// Wall time spent inside the blocking backend call, in milliseconds.
    pub processing_time_ms: f64,
}

impl Recognition {
    /// Build a `Recognition` from the backend's hypothesis list, taking the
    /// top hypothesis the way the wire protocol expects.
    pub fn from_hypotheses(hypotheses: Vec<Hypothesis>, started: Instant) -> Self {
        let text = hypotheses
            .into_iter()
            .next()
            .map(|h| h.text.trim().to_string())
            .unwrap_or_default();
        let confidence = if text.is_empty() { 0.0 } else { DEFAULT_CONFIDENCE };
        Self {
            text,
            confidence,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_recognizer_returns_no_hypotheses() {
        let mut recognizer = NullRecognizer;
        let samples = vec![0.0f32; 16000];
        let hypotheses = recognizer.recognize(&samples).unwrap();
        assert!(hypotheses.is_empty());
        assert_eq!(recognizer.name(), "null");
    }

    #[test]
    fn test_recognition_takes_top_hypothesis() {
        let hypotheses = vec![
            Hypothesis { text: "  hello world  ".to_string() },
            Hypothesis { text: "hello word".to_string() },
        ];
        let recognition = Recognition::from_hypotheses(hypotheses, Instant::now());
        assert_eq!(recognition.text, "hello world");
        assert_eq!(recognition.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_empty_hypotheses_yield_empty_text_with_zero_confidence() {
        let recognition = Recognition::from_hypotheses(Vec::new(), Instant::now());
        assert!(recognition.text.is_empty());
        assert_eq!(recognition.confidence, 0.0);
    }
}

//! # Audio Frame Decoder
//!
//! Stateless conversion of an encoded audio payload into a normalized sample
//! buffer. Payloads arrive as base64 text carrying little-endian signed
//! 16-bit PCM at 16 kHz mono; successful decodes yield 32-bit floats in
//! [-1.0, 1.0], the format expected by speech models.
//!
//! The size ceiling is enforced against the *encoded* length before any
//! decoding work happens, so oversized payloads cost nothing beyond a length
//! comparison. Every failure mode comes back as a tagged `DecodeError`;
//! nothing here panics on client input.

use crate::error::DecodeError;
use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Decode a base64 audio payload into normalized float samples.
///
/// ## Parameters:
/// - **encoded**: base64 text as received on the wire
/// - **max_encoded_len**: ceiling on the encoded length, in bytes
///
/// ## Returns:
/// - **Ok(samples)**: one f32 per source i16 sample, each in [-1.0, 1.0]
/// - **Err(DecodeError::TooLarge)**: ceiling exceeded, nothing was decoded
/// - **Err(DecodeError::Malformed)**: bad base64 or odd byte count
pub fn decode_audio(encoded: &str, max_encoded_len: usize) -> Result<Vec<f32>, DecodeError> {
    if encoded.len() > max_encoded_len {
        return Err(DecodeError::TooLarge {
            encoded_len: encoded.len(),
            max_len: max_encoded_len,
        });
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(DecodeError::Malformed(format!(
            "odd byte count {} cannot be 16-bit PCM",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(&bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / 32768.0);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LEN: usize = 1024 * 1024;

    /// Encode i16 samples into the wire format the decoder expects.
    fn encode_pcm(samples: &[i16]) -> String {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_round_trip_preserves_sample_count_and_values() {
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767, -32768, 1, -1];
        let encoded = encode_pcm(&pcm);
        let decoded = decode_audio(&encoded, MAX_LEN).unwrap();

        assert_eq!(decoded.len(), pcm.len());
        for (original, decoded) in pcm.iter().zip(decoded.iter()) {
            let expected = *original as f32 / 32768.0;
            assert!(
                (decoded - expected).abs() <= 1.0 / 32768.0,
                "sample {} decoded to {}",
                original,
                decoded
            );
        }
    }

    #[test]
    fn test_decoded_samples_are_normalized() {
        let pcm: Vec<i16> = vec![i16::MIN, i16::MAX];
        let decoded = decode_audio(&encode_pcm(&pcm), MAX_LEN).unwrap();
        for sample in decoded {
            assert!((-1.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn test_oversized_payload_rejected_before_decode() {
        let encoded = "A".repeat(MAX_LEN + 1);
        match decode_audio(&encoded, MAX_LEN) {
            Err(DecodeError::TooLarge { encoded_len, max_len }) => {
                assert_eq!(encoded_len, MAX_LEN + 1);
                assert_eq!(max_len, MAX_LEN);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let result = decode_audio("not!!valid@@base64", MAX_LEN);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_odd_byte_count_is_malformed() {
        // Three raw bytes cannot hold a whole number of i16 samples.
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let result = decode_audio(&encoded, MAX_LEN);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_empty_payload_decodes_to_no_samples() {
        let decoded = decode_audio("", MAX_LEN).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_silence_decodes_to_zeros() {
        let pcm = vec![0i16; 16000];
        let decoded = decode_audio(&encode_pcm(&pcm), MAX_LEN).unwrap();
        assert_eq!(decoded.len(), 16000);
        assert!(decoded.iter().all(|&s| s == 0.0));
    }
}

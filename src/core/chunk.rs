//! Chunk codec: strict base64 over fixed-size plaintext blocks.
//!
//! The codec is pure and stateless. Framing (the block size) is decided
//! by the serving side; see [`Limits::chunk_plain_bytes`].
//!
//! [`Limits::chunk_plain_bytes`]: crate::core::Limits

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed base64 chunk: {0}")]
pub struct ChunkDecodeError(#[from] base64::DecodeError);

/// Encode a chunk payload as base64 without line breaks.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 chunk payload, rejecting non-alphabet characters.
pub fn decode(text: &str) -> Result<Vec<u8>, ChunkDecodeError> {
    Ok(STANDARD.decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        for payload in [&b""[..], &b"hello"[..], &all_bytes] {
            let text = encode(payload);
            assert!(!text.contains('\n'));
            assert_eq!(decode(&text).expect("decode"), payload);
        }
    }

    #[test]
    fn decode_rejects_non_alphabet() {
        assert!(decode("not base64!").is_err());
        assert!(decode("aGVsbG8\n=").is_err());
    }

    #[test]
    fn decode_rejects_bad_padding() {
        assert!(decode("aGVsbG8").is_err());
    }
}

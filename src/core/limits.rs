//! Engine limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Tunable limits for the transfer engine.
///
/// Values are intentionally explicit about their units to avoid
/// confusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Plaintext bytes per transfer chunk. Sized so the base64-expanded
    /// payload plus envelope overhead fits a small RPC frame.
    pub chunk_plain_bytes: usize,

    /// Read buffer for streaming content hashes.
    pub hash_buf_bytes: usize,

    /// File size above which the hasher logs a warning. The digest is
    /// still correct past this point; the protocol's 32-bit offsets are
    /// the real ceiling.
    pub hash_warn_bytes: u64,

    /// Interval between retry passes over in-flight transfers.
    pub tick_interval_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            chunk_plain_bytes: 450,
            hash_buf_bytes: 8 * 1024,
            hash_warn_bytes: 1 << 32,
            tick_interval_ms: 1_000,
        }
    }
}

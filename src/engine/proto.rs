//! Transfer RPC schemas and their JSON envelope.
//!
//! Two messages share one envelope, discriminated by `type`. `start` is a
//! 32-bit offset, so a single blob is addressable up to 4 GiB.
//! `old_version` is reserved for delta negotiation: always sent empty,
//! ignored on receive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::chunk::ChunkDecodeError;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed rpc envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error(transparent)]
    Chunk(#[from] ChunkDecodeError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcEnvelope {
    Request(Request),
    Response(Response),
}

/// "Send me bytes of `(key, version)` starting at `start`."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub key: String,
    pub version: String,
    pub old_version: String,
    pub start: u32,
}

impl Request {
    pub fn new(key: impl Into<String>, version: impl Into<String>, start: u32) -> Self {
        Self {
            key: key.into(),
            version: version.into(),
            old_version: String::new(),
            start,
        }
    }
}

/// One chunk of a blob, or a repudiation of the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub key: String,
    pub version: String,
    pub old_version: String,
    pub start: u32,
    /// Base64 chunk payload, at most the serving side's block size once
    /// decoded.
    pub data: String,
    pub ec: ErrorCode,
}

impl Response {
    /// Build the response to `request`, echoing its addressing fields.
    pub fn to(request: &Request, data: String, ec: ErrorCode) -> Self {
        Self {
            key: request.key.clone(),
            version: request.version.clone(),
            old_version: request.old_version.clone(),
            start: request.start,
            data,
            ec,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// More chunks follow.
    Ok,
    /// This chunk is the last.
    Eof,
    /// The peer has no such key.
    NoKey,
    /// The peer has the key but not this version.
    NoVersion,
}

impl ErrorCode {
    pub fn is_negative(self) -> bool {
        matches!(self, ErrorCode::NoKey | ErrorCode::NoVersion)
    }
}

pub fn decode(value: Value) -> Result<RpcEnvelope, ProtoError> {
    Ok(serde_json::from_value(value)?)
}

pub fn encode(envelope: &RpcEnvelope) -> Value {
    serde_json::to_value(envelope).expect("rpc envelope serializes")
}

#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod store;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the engine surface at the crate root for convenience
pub use crate::core::{chunk, hash, Limits, PENDING_SUFFIX, SCRATCH_SUFFIX};
pub use crate::engine::proto::{ErrorCode, Request, Response, RpcEnvelope};
pub use crate::engine::{EngineError, Scratch, SendHandler, TransferEngine};
pub use crate::store::{Store, StoreError};

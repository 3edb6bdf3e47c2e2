use thiserror::Error;

use crate::config::ConfigError;
use crate::core::chunk::ChunkDecodeError;
use crate::core::hash::HashError;
use crate::engine::{EngineError, ProtoError};
use crate::store::StoreError;

/// Crate-level convenience error.
///
/// Not a "god error": a thin wrapper over the component errors, for
/// callers who drive several of them through one `?` chain.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Chunk(#[from] ChunkDecodeError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

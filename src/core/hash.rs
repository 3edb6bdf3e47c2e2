//! Streaming content hash over a file.
//!
//! The canonical version id for locally produced content is the SHA-1 of
//! its bytes, rendered as 40 lowercase hex digits. SHA-1 is kept for wire
//! compatibility with existing peers; everything else in the crate treats
//! version ids as opaque, so a stronger digest can be swapped in here
//! without touching the other contracts.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::warn;

use crate::core::Limits;

pub type HashResult<T> = Result<T, HashError>;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hash a file's contents in bounded reads, returning the hex version id.
pub fn hash_file(path: &Path, limits: &Limits) -> HashResult<String> {
    let io_err = |source| HashError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    if size > limits.hash_warn_bytes {
        warn!(
            path = %path.display(),
            size,
            "hashing a file past the protocol's addressable range"
        );
    }

    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; limits.hash_buf_bytes.max(1)];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

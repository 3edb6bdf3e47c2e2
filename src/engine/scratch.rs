//! Scratch handles: locally mutable staging files.

use std::path::{Path, PathBuf};

/// Handle to a scratch file.
///
/// The path is stable until the scratch is closed, renamed, or killed;
/// edits happen out-of-band through ordinary file I/O. A scratch is
/// never visible to peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scratch {
    path: PathBuf,
    key: String,
    version: String,
}

impl Scratch {
    pub(crate) fn new(path: PathBuf, key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path,
            key: key.into(),
            version: version.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tagged version name (always ends in `.scratch`).
    pub fn version(&self) -> &str {
        &self.version
    }
}

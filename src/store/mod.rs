//! On-disk persistence for versioned values.
//!
//! Each `(key, version)` pair maps to one regular file under the root:
//! `root/<enc(key)>/<enc(version)>`, where `enc` percent-encodes every
//! byte outside `[A-Za-z0-9._-]`. The mapping is deterministic and
//! injective, keys and versions stay opaque, and promotion renames stay
//! inside a single key directory.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such key: {key}")]
    NoSuchKey { key: String },
    #[error("no such version {version} for key {key}")]
    NoSuchVersion { key: String, version: String },
    #[error("entry already exists: ({key}, {version})")]
    AlreadyExists { key: String, version: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

/// Root directory holding every version of every key.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::io(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(encode_component(key))
    }

    fn entry_path(&self, key: &str, version: &str) -> PathBuf {
        self.key_dir(key).join(encode_component(version))
    }

    /// True if any version (tagged or not) exists for `key`.
    pub fn exists_key(&self, key: &str) -> bool {
        match fs::read_dir(self.key_dir(key)) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// True if `(key, version)` has a file, whatever its tag.
    pub fn exists(&self, key: &str, version: &str) -> bool {
        self.entry_path(key, version).is_file()
    }

    /// Enumerate every entry, tagged and untagged. Callers filter by
    /// suffix.
    pub fn versions(&self) -> StoreResult<BTreeMap<String, Vec<String>>> {
        let mut out = BTreeMap::new();
        let entries = fs::read_dir(&self.root).map_err(StoreError::io(&self.root))?;
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&self.root))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(key) = decode_entry_name(&entry.path()) else {
                debug!(path = %entry.path().display(), "skipping undecodable key dir");
                continue;
            };
            let versions = self.versions_of(&key)?;
            if !versions.is_empty() {
                out.insert(key, versions);
            }
        }
        Ok(out)
    }

    /// Every version (tagged and untagged) under one key, sorted.
    /// An unknown key yields an empty list.
    pub fn versions_of(&self, key: &str) -> StoreResult<Vec<String>> {
        let dir = self.key_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&dir))?;
            if !entry.path().is_file() {
                continue;
            }
            let Some(version) = decode_entry_name(&entry.path()) else {
                debug!(path = %entry.path().display(), "skipping undecodable version file");
                continue;
            };
            versions.push(version);
        }
        versions.sort();
        Ok(versions)
    }

    /// Path of an existing entry.
    pub fn path(&self, key: &str, version: &str) -> StoreResult<PathBuf> {
        if !self.exists_key(key) {
            return Err(StoreError::NoSuchKey {
                key: key.to_string(),
            });
        }
        let path = self.entry_path(key, version);
        if !path.is_file() {
            return Err(StoreError::NoSuchVersion {
                key: key.to_string(),
                version: version.to_string(),
            });
        }
        Ok(path)
    }

    /// Create an empty entry and return its path.
    pub fn add(&self, key: &str, version: &str) -> StoreResult<PathBuf> {
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
        let path = self.entry_path(key, version);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(path),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists {
                key: key.to_string(),
                version: version.to_string(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Atomically rename `(k1, v1)` to `(k2, v2)`.
    ///
    /// Fails if the source is absent or the destination present. The
    /// parent directories are fsynced afterwards so the rename survives a
    /// crash even where same-directory rename alone is not durable.
    pub fn rename(&self, k1: &str, v1: &str, k2: &str, v2: &str) -> StoreResult<()> {
        let src = self.path(k1, v1)?;
        let dst = self.entry_path(k2, v2);
        if dst.is_file() {
            return Err(StoreError::AlreadyExists {
                key: k2.to_string(),
                version: v2.to_string(),
            });
        }
        let dst_dir = self.key_dir(k2);
        fs::create_dir_all(&dst_dir).map_err(StoreError::io(&dst_dir))?;
        fs::rename(&src, &dst).map_err(StoreError::io(&dst))?;
        fsync_dir(&dst_dir)?;
        let src_dir = self.key_dir(k1);
        if src_dir != dst_dir {
            fsync_dir(&src_dir)?;
            remove_dir_if_empty(&src_dir);
        }
        Ok(())
    }

    /// Remove an entry. Silently succeeds if it is already gone.
    pub fn kill(&self, key: &str, version: &str) -> StoreResult<()> {
        let path = self.entry_path(key, version);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(StoreError::Io { path, source }),
        }
        remove_dir_if_empty(&self.key_dir(key));
        Ok(())
    }
}

fn fsync_dir(dir: &Path) -> StoreResult<()> {
    let file = File::open(dir).map_err(StoreError::io(dir))?;
    file.sync_all().map_err(StoreError::io(dir))
}

fn remove_dir_if_empty(dir: &Path) {
    // Fails with ENOTEMPTY when versions remain, which is the point.
    let _ = fs::remove_dir(dir);
}

fn encode_component(raw: &str) -> String {
    // "." and ".." would survive the byte filter below verbatim and act
    // as filesystem navigation tokens, escaping the root. Encode them
    // wholesale; '%' is escaped everywhere else, so no other input can
    // collide with these forms.
    if raw == "." || raw == ".." {
        return raw.bytes().map(|byte| format!("%{byte:02X}")).collect();
    }
    let mut out = String::with_capacity(raw.len());
    for &byte in raw.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_component(encoded: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut rest = encoded.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

fn decode_entry_name(path: &Path) -> Option<String> {
    decode_component(path.file_name()?.to_str()?)
}

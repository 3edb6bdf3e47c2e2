//! Transfer engine: in-flight transfer state, the request/response
//! protocol, commit handling, and the scratch lifecycle.
//!
//! The engine runs on a single event-loop thread; every entry point is
//! invoked serially and none of them suspends. Disk I/O is blocking and
//! bounded by the chunk block size; network sends go through a callback
//! that must not block on a reply. Progress on lossy links is purely
//! timer-driven: a lost reply is re-requested on the next [`tick`].
//!
//! [`tick`]: TransferEngine::tick

pub mod pending;
pub mod proto;
pub mod scratch;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::hash::{self, HashError};
use crate::core::{chunk, tag, Limits, SCRATCH_SUFFIX};
use crate::store::{Store, StoreError};

pub use pending::{Gap, PendingTransfer, Placement};
pub use proto::{ErrorCode, ProtoError, Request, Response, RpcEnvelope};
pub use scratch::Scratch;

/// Transport send callback: `(peer_id, rpc_value)`. Must not block on a
/// reply.
pub type SendHandler = Box<dyn Fn(&str, Value)>;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("transfer in progress for ({key}, {version})")]
    InProgress { key: String, version: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type PendingKey = (String, String);

/// One node's content-transfer engine over a storage root.
///
/// Owns the pending-transfer map and the store; consensus drives it via
/// [`commit_handler`], transport via [`handle_rpc`], the runtime via
/// [`tick`], and the filesystem front-end via the accessors and the
/// scratch operations.
///
/// [`commit_handler`]: TransferEngine::commit_handler
/// [`handle_rpc`]: TransferEngine::handle_rpc
/// [`tick`]: TransferEngine::tick
pub struct TransferEngine {
    store: Store,
    limits: Limits,
    pending: BTreeMap<PendingKey, PendingTransfer>,
    send: SendHandler,
}

impl TransferEngine {
    pub fn new(store: Store, limits: Limits, send: SendHandler) -> Self {
        Self {
            store,
            limits,
            pending: BTreeMap::new(),
            send,
        }
    }

    pub fn from_config(config: &Config, send: SendHandler) -> EngineResult<Self> {
        let store = Store::open(&config.storage_root)?;
        Ok(Self::new(store, config.limits.clone(), send))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ---- transport surface -------------------------------------------

    /// Dispatch one inbound RPC by its envelope type. Requests produce a
    /// response value to hand back to the peer; responses and malformed
    /// envelopes produce nothing.
    pub fn handle_rpc(&mut self, from: &str, value: Value) -> Option<Value> {
        match proto::decode(value) {
            Ok(RpcEnvelope::Request(request)) => {
                let response = self.handle_request(&request);
                Some(proto::encode(&RpcEnvelope::Response(response)))
            }
            Ok(RpcEnvelope::Response(response)) => {
                self.handle_response(from, &response);
                None
            }
            Err(error) => {
                warn!(%from, %error, "dropping malformed rpc");
                None
            }
        }
    }

    /// Serve one chunk of a final version. Never fails: every internal
    /// problem is translated into a response error code.
    pub fn handle_request(&self, rpc: &Request) -> Response {
        match self.serve(rpc) {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    key = %rpc.key,
                    version = %rpc.version,
                    start = rpc.start,
                    %error,
                    "serving chunk request failed"
                );
                Response::to(rpc, String::new(), ErrorCode::Eof)
            }
        }
    }

    fn serve(&self, rpc: &Request) -> EngineResult<Response> {
        if !self.store.exists_key(&rpc.key) {
            return Ok(Response::to(rpc, String::new(), ErrorCode::NoKey));
        }
        // Pending and scratch entries are never served.
        if !tag::is_final(&rpc.version) || !self.store.exists(&rpc.key, &rpc.version) {
            return Ok(Response::to(rpc, String::new(), ErrorCode::NoVersion));
        }

        let path = self.store.path(&rpc.key, &rpc.version)?;
        let io_err = |source| EngineError::Io {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        if u64::from(rpc.start) >= size {
            return Ok(Response::to(rpc, String::new(), ErrorCode::Eof));
        }
        file.seek(SeekFrom::Start(rpc.start.into())).map_err(io_err)?;

        let block = self.limits.chunk_plain_bytes;
        let mut buf = vec![0u8; block];
        let mut filled = 0;
        while filled < block {
            let n = file.read(&mut buf[filled..]).map_err(io_err)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let ec = if filled < block {
            ErrorCode::Eof
        } else {
            ErrorCode::Ok
        };
        Ok(Response::to(rpc, chunk::encode(&buf[..filled]), ec))
    }

    /// Accept one response chunk. Logs and drops on any internal failure
    /// so a bad peer cannot destabilize the engine.
    pub fn handle_response(&mut self, from: &str, rpc: &Response) {
        if rpc.ec.is_negative() {
            self.abandon(from, rpc);
            return;
        }
        if let Err(error) = self.ingest_chunk(from, rpc) {
            warn!(
                key = %rpc.key,
                version = %rpc.version,
                %from,
                %error,
                "dropping response chunk"
            );
        }
    }

    fn abandon(&mut self, from: &str, rpc: &Response) {
        let pending_version = tag::pending_name(&rpc.version);
        self.pending
            .remove(&(rpc.key.clone(), pending_version.clone()));
        if self.store.exists(&rpc.key, &pending_version) {
            if let Err(error) = self.store.kill(&rpc.key, &pending_version) {
                warn!(key = %rpc.key, version = %pending_version, %error, "failed to drop pending file");
            }
        }
        let reason = match rpc.ec {
            ErrorCode::NoKey => "no such key",
            _ => "no such version",
        };
        warn!(key = %rpc.key, version = %rpc.version, %from, reason, "transfer abandoned");
    }

    fn ingest_chunk(&mut self, from: &str, rpc: &Response) -> EngineResult<()> {
        // If the final version exists we already have all of it.
        if self.exists(&rpc.key, &rpc.version) {
            debug!(key = %rpc.key, version = %rpc.version, "chunk for completed transfer ignored");
            return Ok(());
        }

        let pending_version = tag::pending_name(&rpc.version);
        let path = if self.store.exists(&rpc.key, &pending_version) {
            self.store.path(&rpc.key, &pending_version)?
        } else {
            self.store.add(&rpc.key, &pending_version)?
        };

        let slot = (rpc.key.clone(), pending_version.clone());
        let info = self.pending.entry(slot.clone()).or_insert_with(|| {
            PendingTransfer::new(
                rpc.key.clone(),
                rpc.version.clone(),
                pending_version.clone(),
                from,
            )
        });

        let Some(placement) = info.placement(rpc.start) else {
            debug!(
                key = %rpc.key,
                version = %rpc.version,
                start = rpc.start,
                length = info.length,
                "discarding misplaced chunk"
            );
            return Ok(());
        };

        if !rpc.data.is_empty() {
            let bytes = chunk::decode(&rpc.data).map_err(ProtoError::from)?;
            if bytes.len() > self.limits.chunk_plain_bytes {
                warn!(
                    key = %rpc.key,
                    version = %rpc.version,
                    start = rpc.start,
                    len = bytes.len(),
                    "discarding oversized chunk"
                );
                return Ok(());
            }
            let io_err = |source| EngineError::Io {
                path: path.clone(),
                source,
            };
            let mut file = OpenOptions::new().write(true).open(&path).map_err(io_err)?;
            // Writing past EOF leaves a zero-filled hole; the interval is
            // recorded as a gap below.
            file.seek(SeekFrom::Start(rpc.start.into())).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            info.record_write(rpc.start, bytes.len() as u32, placement);
        }

        if rpc.ec == ErrorCode::Eof {
            info.eof_seen = true;
        }

        if info.is_complete() {
            let io_err = |source| EngineError::Io {
                path: path.clone(),
                source,
            };
            File::open(&path).map_err(io_err)?.sync_all().map_err(io_err)?;
            self.store
                .rename(&rpc.key, &pending_version, &rpc.key, &rpc.version)?;
            self.pending.remove(&slot);
            info!(key = %rpc.key, version = %rpc.version, %from, "transfer complete");
        }
        Ok(())
    }

    // ---- consensus surface -------------------------------------------

    /// Register a committed `(key, version)` whose bytes `from` holds,
    /// then fire the initial chunk request. Fire-and-forget: every
    /// failure is caught and logged so consensus never blocks on us.
    pub fn commit_handler(&mut self, from: &str, key: &str, version: &str) {
        if let Err(error) = self.register_commit(from, key, version) {
            error!(%key, %version, %from, %error, "failed to register commit");
        }
    }

    fn register_commit(&mut self, from: &str, key: &str, version: &str) -> EngineResult<()> {
        if self.exists(key, version) {
            debug!(%key, %version, "commit already satisfied locally");
            return Ok(());
        }
        let pending_version = tag::pending_name(version);
        if !self.store.exists(key, &pending_version) {
            self.store.add(key, &pending_version)?;
        }
        self.pending
            .entry((key.to_string(), pending_version.clone()))
            .or_insert_with(|| PendingTransfer::new(key, version, pending_version, from));

        let request = Request::new(key, version, 0);
        (self.send)(from, proto::encode(&RpcEnvelope::Request(request)));
        Ok(())
    }

    // ---- runtime surface ---------------------------------------------

    /// Re-request the next missing interval of every in-flight transfer:
    /// the first gap if any remain, otherwise the append point. A no-op
    /// with nothing pending; idempotent under duplicate replies because
    /// of chunk placement checks.
    pub fn tick(&self) {
        for info in self.pending.values() {
            let start = info.next_request_offset();
            debug!(
                key = %info.key,
                version = %info.true_version,
                start,
                source = %info.source,
                "re-requesting chunk"
            );
            let request = Request::new(info.key.clone(), info.true_version.clone(), start);
            (self.send)(&info.source, proto::encode(&RpcEnvelope::Request(request)));
        }
    }

    // ---- read accessors ----------------------------------------------

    /// True if any version (in whatever lifecycle state) exists for `key`.
    pub fn exists_key(&self, key: &str) -> bool {
        self.store.exists_key(key)
    }

    /// True only for final versions: pending and scratch entries are
    /// invisible here.
    pub fn exists(&self, key: &str, version: &str) -> bool {
        tag::is_final(version)
            && !self
                .pending
                .contains_key(&(key.to_string(), tag::pending_name(version)))
            && self.store.exists(key, version)
    }

    /// Final versions of `key`, tags filtered out. Unknown keys yield an
    /// empty list.
    pub fn versions(&self, key: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .store
            .versions_of(key)?
            .into_iter()
            .filter(|version| tag::is_final(version))
            .collect())
    }

    /// Scratches of `key`.
    pub fn scratches(&self, key: &str) -> EngineResult<Vec<Scratch>> {
        let mut out = Vec::new();
        for version in self.store.versions_of(key)? {
            if !tag::is_scratch(&version) {
                continue;
            }
            let path = self.store.path(key, &version)?;
            out.push(Scratch::new(path, key, version));
        }
        Ok(out)
    }

    /// Path of a final version's file. The path is stable only for the
    /// duration of the call that returned it.
    pub fn path(&self, key: &str, version: &str) -> EngineResult<PathBuf> {
        let in_flight = self
            .pending
            .contains_key(&(key.to_string(), tag::pending_name(version)))
            || self
                .pending
                .contains_key(&(key.to_string(), version.to_string()));
        if in_flight {
            return Err(EngineError::InProgress {
                key: key.to_string(),
                version: version.to_string(),
            });
        }
        Ok(self.store.path(key, version)?)
    }

    /// Alias for [`path`](TransferEngine::path).
    pub fn get(&self, key: &str, version: &str) -> EngineResult<PathBuf> {
        self.path(key, version)
    }

    /// In-flight record for `(key, version)`, looked up by true version.
    pub fn pending_transfer(&self, key: &str, version: &str) -> Option<&PendingTransfer> {
        self.pending
            .get(&(key.to_string(), tag::pending_name(version)))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ---- scratch workflow --------------------------------------------

    /// Create a scratch seeded with the bytes of a final version.
    pub fn open(&self, key: &str, version: &str) -> EngineResult<Scratch> {
        if !tag::is_final(version) {
            return Err(StoreError::NoSuchVersion {
                key: key.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        let src = self.path(key, version)?;
        let scratch_version = tag::scratch_name(version);
        let path = self.store.add(key, &scratch_version)?;
        fs::copy(&src, &path).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Scratch::new(path, key, scratch_version))
    }

    /// Create an empty scratch for a key with no source version.
    pub fn add(&self, key: &str) -> EngineResult<Scratch> {
        let path = self.store.add(key, SCRATCH_SUFFIX)?;
        Ok(Scratch::new(path, key, SCRATCH_SUFFIX))
    }

    /// Promote a scratch to the immutable version named by its content
    /// hash. Fails if that version already exists for the key.
    pub fn close(&self, scratch: &Scratch) -> EngineResult<String> {
        let version = hash::hash_file(scratch.path(), &self.limits)?;
        self.store
            .rename(scratch.key(), scratch.version(), scratch.key(), &version)?;
        Ok(version)
    }

    /// Promote a scratch under a brand-new key. Fails if the key is
    /// already known.
    pub fn rename(&self, new_key: &str, scratch: &Scratch) -> EngineResult<String> {
        let version = hash::hash_file(scratch.path(), &self.limits)?;
        if self.store.exists_key(new_key) {
            return Err(StoreError::AlreadyExists {
                key: new_key.to_string(),
                version,
            }
            .into());
        }
        self.store
            .rename(scratch.key(), scratch.version(), new_key, &version)?;
        Ok(version)
    }

    /// Discard a scratch.
    pub fn kill(&self, scratch: &Scratch) -> EngineResult<()> {
        Ok(self.store.kill(scratch.key(), scratch.version())?)
    }
}

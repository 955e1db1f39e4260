use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::AssemblyError;

const BLOB_SCHEME: &str = "blob:craft/";

/// Session-local reference to fully assembled content.
///
/// The URL only resolves through the [`BlobRegistry`] that issued it, and only
/// until it is revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    local_url: String,
    len: u64,
}

impl BlobHandle {
    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Session-scoped store behind `blob:` URLs.
///
/// Clones share the same storage, so the registry can be handed to every
/// transfer and to the scene that eventually releases the handles.
#[derive(Debug, Clone)]
pub struct BlobRegistry {
    session: Uuid,
    next_id: Arc<AtomicU64>,
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl Default for BlobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self {
            session: Uuid::new_v4(),
            next_id: Arc::new(AtomicU64::new(1)),
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stores the bytes and returns a fresh handle for them.
    pub fn register(&self, data: Bytes) -> BlobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let local_url = format!("{BLOB_SCHEME}{}/{id}", self.session);
        let len = data.len() as u64;
        self.blobs.write().insert(local_url.clone(), data);
        BlobHandle { local_url, len }
    }

    /// Returns the bytes behind a local URL, if it is still registered.
    pub fn resolve(&self, local_url: &str) -> Option<Bytes> {
        self.blobs.read().get(local_url).cloned()
    }

    /// Releases a handle. Returns `false` when the URL was unknown.
    pub fn revoke(&self, local_url: &str) -> bool {
        self.blobs.write().remove(local_url).is_some()
    }

    /// Whether the URL was issued by this session.
    pub fn owns(&self, url: &str) -> bool {
        url.strip_prefix(BLOB_SCHEME)
            .map(|rest| rest.starts_with(&self.session.to_string()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AssemblerState {
    Pending,
    Receiving,
    Ended,
    Finalized(BlobHandle),
}

/// Concatenates chunks in arrival order into a single blob.
#[derive(Debug)]
pub struct BlobAssembler {
    buffer: BytesMut,
    state: AssemblerState,
}

impl Default for BlobAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: AssemblerState::Pending,
        }
    }

    /// Assembles a complete chunk sequence in one go.
    pub fn assemble<I>(chunks: I, registry: &BlobRegistry) -> Result<BlobHandle, AssemblyError>
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut assembler = Self::new();
        assembler.begin();
        for chunk in chunks {
            assembler.push(&chunk);
        }
        assembler.end();
        assembler.finalize(registry)
    }

    /// Marks the stream as started, so that an empty body still finalizes.
    pub fn begin(&mut self) {
        if self.state == AssemblerState::Pending {
            self.state = AssemblerState::Receiving;
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.begin();
        if self.state == AssemblerState::Receiving {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Records end-of-stream.
    pub fn end(&mut self) {
        if self.state == AssemblerState::Receiving {
            self.state = AssemblerState::Ended;
        }
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        match &self.state {
            AssemblerState::Finalized(handle) => handle.len() as usize,
            _ => self.buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the assembled bytes. Calling it again returns the same handle.
    pub fn finalize(&mut self, registry: &BlobRegistry) -> Result<BlobHandle, AssemblyError> {
        match &self.state {
            AssemblerState::Pending => Err(AssemblyError::NotStarted),
            AssemblerState::Receiving => Err(AssemblyError::Incomplete),
            AssemblerState::Finalized(handle) => Ok(handle.clone()),
            AssemblerState::Ended => {
                let data = std::mem::take(&mut self.buffer).freeze();
                let handle = registry.register(data);
                self.state = AssemblerState::Finalized(handle.clone());
                Ok(handle)
            }
        }
    }
}

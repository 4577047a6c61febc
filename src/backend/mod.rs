use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{MediaError, MediaResult, UploadPart};

pub mod fs;
pub mod memory;
pub mod s3;

/// Cumulative byte count for the part currently being transferred.
///
/// Backends call this as body bytes go out; how often is backend-specific
/// (chunked for local transports, per-part for the S3 SDK).
pub type ProgressSink<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Result of storing one part
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub etag: Option<String>,
    pub size: u64,
}

/// One listed object, as the backend reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Transport contract every storage backend implements.
///
/// The facade owns key composition, ordering, progress accounting, and
/// URL building; backends only move bytes.
#[async_trait]
pub trait ObjectBackend: Send + Sync + std::fmt::Debug {
    /// Store one part, reporting incremental byte progress through the sink
    async fn put(&self, part: &UploadPart, progress: ProgressSink<'_>) -> MediaResult<PutOutcome>;

    /// List entries under a key prefix (pseudo-directories included as-is)
    async fn list(&self, prefix: &str) -> MediaResult<Vec<ObjectEntry>>;

    /// Fetch one object's body
    async fn get(&self, key: &str) -> MediaResult<Bytes>;

    /// Remove one object; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> MediaResult<()>;
}

/// Enumerated backend identifier, replacing resolve-by-string-name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    S3,
    Filesystem,
    Memory,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Filesystem => write!(f, "filesystem"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Registry mapping [`TransportKind`] to a backend instance.
///
/// Resolution of an unregistered kind is a configuration error, surfaced
/// as [`MediaError::TransportConfig`] at store construction.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<TransportKind, Arc<dyn ObjectBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: ObjectBackend + 'static>(mut self, kind: TransportKind, backend: B) -> Self {
        self.backends.insert(kind, Arc::new(backend));
        self
    }

    pub fn resolve(&self, kind: TransportKind) -> MediaResult<Arc<dyn ObjectBackend>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or(MediaError::TransportConfig {
                name: kind.to_string(),
            })
    }
}

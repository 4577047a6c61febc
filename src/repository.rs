use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{MediaAsset, MediaResult};

/// Persisted descriptive record for a stored asset.
///
/// Owned by the external metadata store; the pipeline only creates records
/// and resolves them back to object keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    /// File name without extension (the ingestion fingerprint)
    pub name: String,
    pub mime: String,
    pub path: String,
    pub ext: String,
    pub size: u64,
    pub namespace_id: i64,
    pub private: bool,
    pub secure: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// Object-store key the record resolves to: `path/name.ext`
    pub fn object_key(&self) -> String {
        format!("{}/{}.{}", self.path, self.name, self.ext)
    }
}

/// Field set for a record about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecordDraft {
    pub name: String,
    pub mime: String,
    pub path: String,
    pub ext: String,
    pub size: u64,
    pub namespace_id: i64,
    pub private: bool,
    pub secure: bool,
}

impl MediaRecordDraft {
    /// Map an ingested asset onto record fields (name is the asset's
    /// file name with the extension stripped, i.e. the fingerprint)
    pub fn from_asset(asset: &MediaAsset, namespace_id: i64) -> Self {
        Self {
            name: asset.fingerprint.to_string(),
            mime: asset.content_type.clone(),
            path: asset.path.clone(),
            ext: asset.extension.clone(),
            size: asset.size,
            namespace_id,
            private: false,
            secure: false,
        }
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// External structured-record store, consumed but not owned by the core.
///
/// An empty lookup is `Ok(None)`, not an error; the orchestrator decides
/// how a missing record surfaces.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn create(&self, draft: MediaRecordDraft) -> MediaResult<MediaRecord>;
    async fn get(&self, id: i64) -> MediaResult<Option<MediaRecord>>;
}

/// In-memory repository for tests and wiring examples
#[derive(Default)]
pub struct MemoryMetadataRepository {
    records: RwLock<BTreeMap<i64, MediaRecord>>,
    next_id: AtomicI64,
}

impl MemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataRepository for MemoryMetadataRepository {
    async fn create(&self, draft: MediaRecordDraft) -> MediaResult<MediaRecord> {
        let now = Utc::now();
        let record = MediaRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: draft.name,
            mime: draft.mime,
            path: draft.path,
            ext: draft.ext,
            size: draft.size,
            namespace_id: draft.namespace_id,
            private: draft.private,
            secure: draft.secure,
            created_at: now,
            updated_at: now,
        };
        self.records.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> MediaResult<Option<MediaRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::png_buffer;
    use crate::{MediaConfig, MediaIngestor};

    #[tokio::test]
    async fn test_create_then_get() {
        let repo = MemoryMetadataRepository::new();
        let asset = MediaIngestor::new(&MediaConfig::default())
            .from_buffer(png_buffer(16, 16), "acme")
            .unwrap();

        let record = repo
            .create(MediaRecordDraft::from_asset(&asset, 7))
            .await
            .unwrap();
        assert_eq!(record.name, asset.fingerprint.to_string());
        assert_eq!(record.object_key(), asset.full_key());

        let found = repo.get(record.id).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let repo = MemoryMetadataRepository::new();
        assert!(repo.get(999).await.unwrap().is_none());
    }
}

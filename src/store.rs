use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;

use crate::backend::{BackendRegistry, ObjectBackend, TransportKind};
use crate::session::SessionTracker;
use crate::{
    MediaAsset, MediaConfig, MediaError, MediaResult, Rendition, StoredObjectReference,
    TransferMode, TransferRules, UploadPart, UploadSession, UploadedFile,
};

/// Transport-agnostic facade over a pluggable storage backend.
///
/// Owns key ordering, byte-level progress accounting, public URL
/// composition, and pseudo-directory filtering; backends only move bytes.
pub struct ObjectStore {
    backend: Arc<dyn ObjectBackend>,
    host_url: String,
    transfer: TransferRules,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn ObjectBackend>, config: &MediaConfig) -> Self {
        Self {
            backend,
            host_url: config.host_url.trim_end_matches('/').to_string(),
            transfer: config.transfer.clone(),
        }
    }

    /// Resolve the backend out of a registry by its enumerated kind
    pub fn from_registry(
        kind: TransportKind,
        registry: &BackendRegistry,
        config: &MediaConfig,
    ) -> MediaResult<Self> {
        Ok(Self::new(registry.resolve(kind)?, config))
    }

    /// Absolute public URL for a stored key
    pub fn file_url(&self, key: &str) -> String {
        format!("{}/{}", self.host_url, key)
    }

    /// Begin the ordered multi-part transfer of an asset and its renditions.
    ///
    /// The part list is fixed up front: main asset first, then each rendition
    /// keyed under the asset's thumbnail directory, in generation order. The
    /// session's byte total is the sum of all part lengths, computed before
    /// the first part is sent. The transfer itself runs on a spawned task;
    /// the returned session observes it.
    pub fn create_upload_stream(
        &self,
        asset: MediaAsset,
        renditions: Vec<Rendition>,
    ) -> UploadSession {
        let mut parts = Vec::with_capacity(1 + renditions.len());
        parts.push(UploadPart::new(
            asset.full_key(),
            asset.buffer.clone(),
            asset.content_type.clone(),
        ));
        for rendition in renditions {
            parts.push(UploadPart::new(
                format!("{}/{}", asset.thumbs_dir, rendition.name),
                rendition.buffer,
                rendition.content_type,
            ));
        }

        let total_bytes = parts.iter().map(|p| p.content_length).sum();
        let (tracker, session) = SessionTracker::channel(parts.len(), total_bytes);

        tracing::debug!(
            session = %tracker.id(),
            parts = parts.len(),
            total_bytes,
            key = %asset.full_key(),
            "starting upload stream"
        );

        let backend = self.backend.clone();
        let host_url = self.host_url.clone();
        let transfer = self.transfer.clone();
        tokio::spawn(async move {
            match transfer.mode {
                TransferMode::Sequential => {
                    drive_sequential(backend, host_url, parts, tracker, transfer.part_timeout).await
                }
                TransferMode::Parallel(limit) => {
                    drive_parallel(
                        backend,
                        host_url,
                        parts,
                        tracker,
                        transfer.part_timeout,
                        limit.max(1),
                    )
                    .await
                }
            }
        });

        session
    }

    /// List entries under a key prefix, dropping pseudo-directory entries
    /// (keys ending in the path separator)
    pub async fn list_by_path(&self, prefix: &str) -> MediaResult<Vec<StoredObjectReference>> {
        Ok(self
            .backend
            .list(prefix)
            .await?
            .into_iter()
            .filter(|entry| !entry.key.ends_with('/'))
            .map(|entry| StoredObjectReference {
                url: self.file_url(&entry.key),
                key: entry.key,
                size: entry.size,
                etag: entry.etag,
            })
            .collect())
    }

    /// List everything stored under a namespace
    pub async fn list_by_namespace(&self, namespace: &str) -> MediaResult<Vec<StoredObjectReference>> {
        self.list_by_path(&format!("{}/", namespace)).await
    }

    /// Fetch a single object's body
    pub async fn get_object(&self, key: &str) -> MediaResult<bytes::Bytes> {
        self.backend.get(key).await
    }

    /// Remove a single object
    pub async fn delete_file(&self, key: &str) -> MediaResult<()> {
        self.backend.delete(key).await
    }
}

fn uploaded_file(part: &UploadPart, host_url: &str, etag: Option<String>) -> UploadedFile {
    UploadedFile {
        key: part.key.clone(),
        url: format!("{}/{}", host_url, part.key),
        content_type: part.content_type.clone(),
        size: part.content_length,
        etag,
    }
}

fn timeout_error(part: &UploadPart, timeout: Duration) -> MediaError {
    MediaError::transport(
        &part.key,
        format!("part transfer timed out after {}ms", timeout.as_millis()),
    )
}

/// Ordered fold over the pending parts with cumulative byte accounting.
/// One part finishes (or fails) before the next begins; a failure aborts
/// the remainder and leaves already-written parts in place.
async fn drive_sequential(
    backend: Arc<dyn ObjectBackend>,
    host_url: String,
    parts: Vec<UploadPart>,
    tracker: Arc<SessionTracker>,
    part_timeout: Duration,
) {
    let mut completed = 0u64;
    for (index, part) in parts.iter().enumerate() {
        let base = completed;
        let progress_tracker = tracker.clone();
        let sink = move |loaded: u64| progress_tracker.set_loaded(base + loaded);

        let outcome = match tokio::time::timeout(part_timeout, backend.put(part, &sink)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(session = %tracker.id(), key = %part.key, %err, "part transfer failed");
                tracker.fail(err);
                return;
            }
            Err(_) => {
                tracing::warn!(session = %tracker.id(), key = %part.key, "part transfer timed out");
                tracker.fail(timeout_error(part, part_timeout));
                return;
            }
        };

        completed += part.content_length;
        tracker.set_loaded(completed);
        tracker.part_done(index, uploaded_file(part, &host_url, outcome.etag));
    }
}

/// Bounded-parallel variant. Each part carries its batch index so the
/// terminal file list keeps batch order whatever the completion order;
/// the only observable difference is progress granularity, which drops
/// to per-part.
async fn drive_parallel(
    backend: Arc<dyn ObjectBackend>,
    host_url: String,
    parts: Vec<UploadPart>,
    tracker: Arc<SessionTracker>,
    part_timeout: Duration,
    limit: usize,
) {
    let completed = Arc::new(AtomicU64::new(0));

    let result = futures::stream::iter(parts.into_iter().enumerate().map(Ok::<_, MediaError>))
        .try_for_each_concurrent(limit, |(index, part)| {
            let backend = backend.clone();
            let tracker = tracker.clone();
            let completed = completed.clone();
            let host_url = host_url.clone();
            async move {
                let outcome = tokio::time::timeout(part_timeout, backend.put(&part, &|_| {}))
                    .await
                    .map_err(|_| timeout_error(&part, part_timeout))??;

                let so_far =
                    completed.fetch_add(part.content_length, Ordering::SeqCst) + part.content_length;
                tracker.set_loaded(so_far);
                tracker.part_done(index, uploaded_file(&part, &host_url, outcome.etag));
                Ok(())
            }
        })
        .await;

    if let Err(err) = result {
        tracing::warn!(session = %tracker.id(), %err, "parallel transfer failed");
        tracker.fail(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{ObjectEntry, ProgressSink, PutOutcome};
    use crate::{Fingerprint, UploadEvent};
    use async_trait::async_trait;
    use bytes::Bytes;

    fn asset(buffer: Bytes) -> MediaAsset {
        let fingerprint = Fingerprint::new();
        MediaAsset {
            name: format!("{}.jpg", fingerprint),
            category: "image".to_string(),
            extension: "jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            size: buffer.len() as u64,
            buffer,
            namespace: "acme".to_string(),
            path: "acme/image".to_string(),
            thumbs_dir: format!("acme/image/{}", fingerprint),
            fingerprint,
        }
    }

    fn rendition(name: &str, len: usize) -> Rendition {
        Rendition {
            buffer: Bytes::from(vec![1u8; len]),
            name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            size: len as u64,
        }
    }

    fn store_with(backend: Arc<MemoryBackend>) -> ObjectStore {
        ObjectStore::new(backend, &MediaConfig::default().with_host_url("http://cdn.test"))
    }

    /// Delays the put of one key so tests can force parts to finish out of
    /// submission order
    #[derive(Debug)]
    struct DelayOn {
        inner: MemoryBackend,
        key: String,
    }

    #[async_trait]
    impl ObjectBackend for DelayOn {
        async fn put(&self, part: &UploadPart, progress: ProgressSink<'_>) -> MediaResult<PutOutcome> {
            if part.key == self.key {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.put(part, progress).await
        }

        async fn list(&self, prefix: &str) -> MediaResult<Vec<ObjectEntry>> {
            self.inner.list(prefix).await
        }

        async fn get(&self, key: &str) -> MediaResult<bytes::Bytes> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> MediaResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_upload_orders_main_asset_first() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        let asset = asset(Bytes::from(vec![0u8; 100]));
        let main_key = asset.full_key();
        let thumbs_dir = asset.thumbs_dir.clone();

        let session = store.create_upload_stream(asset, vec![rendition("50x50.jpg", 10)]);
        assert_eq!(session.total_parts(), 2);
        assert_eq!(session.total_bytes(), 110);

        let files = session.wait().await.unwrap();
        assert_eq!(files[0].key, main_key);
        assert_eq!(files[1].key, format!("{}/50x50.jpg", thumbs_dir));
        assert_eq!(files[0].url, format!("http://cdn.test/{}", main_key));
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_part_failure_aborts_remaining_without_rollback() {
        let asset = asset(Bytes::from(vec![0u8; 100]));
        let failing_key = format!("{}/50x50.jpg", asset.thumbs_dir);
        let backend = Arc::new(MemoryBackend::new().with_failure_on(&failing_key));
        let store = store_with(backend.clone());

        let session = store.create_upload_stream(
            asset,
            vec![rendition("50x50.jpg", 10), rendition("100x100.jpg", 20)],
        );

        assert!(session.wait().await.is_err());
        // Main part landed before the failure and stays in place
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotone_and_complete_fires_at_100() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let mut session =
            store.create_upload_stream(asset(Bytes::from(vec![0u8; 200 * 1024])), vec![]);

        let mut last = 0u8;
        let mut complete = false;
        while let Some(event) = session.next_event().await {
            match event {
                UploadEvent::Progress(pct) => {
                    assert!(pct >= last);
                    last = pct;
                }
                UploadEvent::Complete(_) => {
                    complete = true;
                    break;
                }
                UploadEvent::Error(err) => panic!("unexpected error: {}", err),
            }
        }
        assert!(complete);
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_parallel_mode_preserves_terminal_contract() {
        let backend = Arc::new(MemoryBackend::new());
        let config = MediaConfig::default()
            .with_host_url("http://cdn.test")
            .with_transfer(TransferRules::default().with_mode(TransferMode::Parallel(4)));
        let store = ObjectStore::new(backend.clone(), &config);

        let session = store.create_upload_stream(
            asset(Bytes::from(vec![0u8; 50])),
            vec![rendition("50x50.jpg", 10), rendition("100x100.jpg", 20)],
        );
        let files = session.wait().await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(backend.len(), 3);
    }

    #[tokio::test]
    async fn test_parallel_mode_keeps_batch_order_when_parts_finish_out_of_order() {
        let asset = asset(Bytes::from(vec![0u8; 50]));
        let main_key = asset.full_key();
        let thumbs_dir = asset.thumbs_dir.clone();
        // The main asset lands last; the file list must still lead with it
        let backend = Arc::new(DelayOn {
            inner: MemoryBackend::new(),
            key: main_key.clone(),
        });
        let config = MediaConfig::default()
            .with_host_url("http://cdn.test")
            .with_transfer(TransferRules::default().with_mode(TransferMode::Parallel(3)));
        let store = ObjectStore::new(backend, &config);

        let session = store.create_upload_stream(
            asset,
            vec![rendition("50x50.jpg", 10), rendition("100x100.jpg", 20)],
        );
        let files = session.wait().await.unwrap();
        assert_eq!(files[0].key, main_key);
        assert_eq!(files[1].key, format!("{}/50x50.jpg", thumbs_dir));
        assert_eq!(files[2].key, format!("{}/100x100.jpg", thumbs_dir));
    }

    #[tokio::test]
    async fn test_list_by_path_filters_pseudo_directories() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put(
                &UploadPart::new("acme/image/a.jpg", Bytes::from_static(b"a"), "image/jpeg"),
                &|_| {},
            )
            .await
            .unwrap();
        backend
            .put(
                &UploadPart::new("acme/image/", Bytes::new(), "application/octet-stream"),
                &|_| {},
            )
            .await
            .unwrap();

        let store = store_with(backend);
        let listed = store.list_by_path("acme/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "acme/image/a.jpg");
        assert!(listed[0].etag.is_some());
    }

    #[tokio::test]
    async fn test_list_by_namespace_scopes_to_the_namespace_segment() {
        let backend = Arc::new(MemoryBackend::new());
        for key in ["acme/image/a.jpg", "acmeister/image/b.jpg", "other/image/c.jpg"] {
            backend
                .put(&UploadPart::new(key, Bytes::from_static(b"x"), "image/jpeg"), &|_| {})
                .await
                .unwrap();
        }

        let store = store_with(backend);
        let listed = store.list_by_namespace("acme").await.unwrap();
        // Prefix includes the separator, so "acmeister" must not match
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "acme/image/a.jpg");
        assert_eq!(listed[0].url, "http://cdn.test/acme/image/a.jpg");
    }
}

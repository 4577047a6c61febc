use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{ObjectBackend, ObjectEntry, ProgressSink, PutOutcome};
use crate::{MediaError, MediaResult, UploadPart};

const PROGRESS_CHUNK: u64 = 64 * 1024;

/// In-memory backend for unit tests and wiring examples.
///
/// Reports progress in 64 KiB steps so session-level percentage accounting
/// gets exercised the same way it would against a real transport.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
    fail_key: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any `put` targeting this key; lets tests drive the error path
    pub fn with_failure_on<S: Into<String>>(mut self, key: S) -> Self {
        self.fail_key = Some(key.into());
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

fn etag_of(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put(&self, part: &UploadPart, progress: ProgressSink<'_>) -> MediaResult<PutOutcome> {
        if self.fail_key.as_deref() == Some(part.key.as_str()) {
            return Err(MediaError::transport(&part.key, "injected failure"));
        }

        let total = part.content_length;
        let mut sent = 0u64;
        while sent < total {
            sent = (sent + PROGRESS_CHUNK).min(total);
            progress(sent);
        }
        if total == 0 {
            progress(0);
        }

        self.objects
            .write()
            .insert(part.key.clone(), part.body.clone());

        Ok(PutOutcome {
            etag: Some(etag_of(&part.body)),
            size: total,
        })
    }

    async fn list(&self, prefix: &str) -> MediaResult<Vec<ObjectEntry>> {
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectEntry {
                key: key.clone(),
                size: body.len() as u64,
                etag: Some(etag_of(body)),
            })
            .collect())
    }

    async fn get(&self, key: &str) -> MediaResult<Bytes> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MediaError::not_found(key))
    }

    async fn delete(&self, key: &str) -> MediaResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(key: &str, len: usize) -> UploadPart {
        UploadPart::new(key, Bytes::from(vec![7u8; len]), "application/octet-stream")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let backend = MemoryBackend::new();
        let original = part("a/b.bin", 10);
        backend.put(&original, &|_| {}).await.unwrap();
        assert_eq!(backend.get("a/b.bin").await.unwrap(), original.body);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.get("nope").await.unwrap_err(),
            MediaError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_progress_is_cumulative_and_reaches_total() {
        let backend = MemoryBackend::new();
        let seen = parking_lot::Mutex::new(Vec::new());
        backend
            .put(&part("k", 200 * 1024), &|loaded| seen.lock().push(loaded))
            .await
            .unwrap();
        let seen = seen.into_inner();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 200 * 1024);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::new().with_failure_on("bad/key");
        let err = backend.put(&part("bad/key", 4), &|_| {}).await.unwrap_err();
        assert!(matches!(err, MediaError::Transport { .. }));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        assert!(MemoryBackend::new().delete("nope").await.is_ok());
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::{ObjectBackend, ObjectEntry, ProgressSink, PutOutcome};
use crate::{MediaError, MediaResult, UploadPart};

const WRITE_CHUNK: usize = 64 * 1024;

/// Local filesystem backend: object keys map to paths under a root directory.
///
/// Useful for development and integration tests; not intended to compete with
/// a real bucket service.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> MediaResult<PathBuf> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(MediaError::transport(key, "invalid object key"));
        }
        Ok(self.root.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }
}

#[async_trait]
impl ObjectBackend for FilesystemBackend {
    async fn put(&self, part: &UploadPart, progress: ProgressSink<'_>) -> MediaResult<PutOutcome> {
        let path = self.resolve(&part.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(MediaError::from)?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        for chunk in part.body.chunks(WRITE_CHUNK) {
            file.write_all(chunk).await?;
            hasher.update(chunk);
            written += chunk.len() as u64;
            progress(written);
        }
        file.flush().await?;
        if part.body.is_empty() {
            progress(0);
        }

        Ok(PutOutcome {
            etag: Some(hex::encode(hasher.finalize())),
            size: written,
        })
    }

    async fn list(&self, prefix: &str) -> MediaResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                // Root may not exist yet; an empty store lists nothing
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    entries.push(ObjectEntry {
                        key,
                        size: meta.len(),
                        etag: None,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn get(&self, key: &str) -> MediaResult<Bytes> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> MediaResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

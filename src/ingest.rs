use std::path::Path;

use bytes::Bytes;

use crate::{Fingerprint, MediaConfig, MediaError, MediaResult};

/// Validated, identified representation of one uploaded file prior to storage.
///
/// Ephemeral: lives for the duration of one ingestion/upload, never persisted
/// itself. The metadata record derived from it is what survives.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    /// `<fingerprint>.<ext>`
    pub name: String,
    /// Classification from the allowed-type table, e.g. `image`
    pub category: String,
    /// Extension sniffed from magic bytes, e.g. `jpg`
    pub extension: String,
    /// MIME type sniffed from magic bytes
    pub content_type: String,
    pub size: u64,
    pub buffer: Bytes,
    /// Owning scope the storage path is rooted under (vendor or user)
    pub namespace: String,
    /// `<namespace>/<category>`
    pub path: String,
    /// `<path>/<fingerprint>`, where renditions are keyed
    pub thumbs_dir: String,
    pub fingerprint: Fingerprint,
}

impl MediaAsset {
    /// Canonical object-store key for the main asset
    pub fn full_key(&self) -> String {
        format!("{}/{}", self.path, self.name)
    }

    /// True when the asset's MIME type belongs to the given family prefix
    pub fn is_family(&self, family: &str) -> bool {
        self.content_type.starts_with(family)
    }
}

/// Validates raw bytes against the allowed-type table and produces a
/// [`MediaAsset`] with identity and storage path.
pub struct MediaIngestor {
    config: MediaConfig,
}

impl MediaIngestor {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Ingest from an in-memory buffer.
    ///
    /// Sniffs extension and MIME type from magic bytes, rejects types absent
    /// from the allowed table, and assigns a fresh random fingerprint.
    pub fn from_buffer<B: Into<Bytes>>(&self, buffer: B, namespace: &str) -> MediaResult<MediaAsset> {
        let buffer = buffer.into();
        let sniffed = infer::get(&buffer).ok_or_else(|| MediaError::unsupported("unknown"))?;
        let extension = sniffed.extension().to_string();
        let content_type = sniffed.mime_type().to_string();

        let category = self
            .config
            .category_for(&extension)
            .map(str::to_string)
            .ok_or_else(|| MediaError::unsupported(extension.clone()))?;

        let fingerprint = Fingerprint::new();
        let name = format!("{}.{}", fingerprint, extension);
        let path = format!("{}/{}", namespace, category);
        let thumbs_dir = format!("{}/{}", path, fingerprint);

        Ok(MediaAsset {
            name,
            category,
            extension,
            content_type,
            size: buffer.len() as u64,
            buffer,
            namespace: namespace.to_string(),
            path,
            thumbs_dir,
            fingerprint,
        })
    }

    /// Ingest from a file on disk. Read failures surface as [`MediaError::Read`];
    /// everything past the read is identical to [`from_buffer`](Self::from_buffer).
    pub async fn from_path<P: AsRef<Path>>(&self, path: P, namespace: &str) -> MediaResult<MediaAsset> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(MediaError::read)?;
        self.from_buffer(bytes, namespace)
    }
}

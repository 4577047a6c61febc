use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::repository::{MediaRecord, MediaRecordDraft, MetadataRepository};
use crate::{
    MediaAsset, MediaConfig, MediaError, MediaIngestor, MediaLocator, MediaResult,
    ObjectStore, PdfRasterizer, RenditionGenerator, StoredObjectReference, UploadSession,
};

/// Computed response headers for a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// Sniffed from magic bytes, `application/octet-stream` when unsniffable
    pub content_type: String,
    pub cache_control: String,
    /// HTTP-date expiry matching the cache directive
    pub expires: String,
    /// Hex content hash of the fetched bytes; unrelated to the random
    /// ingestion fingerprint
    pub etag: String,
}

/// Response envelope for a resolved download
#[derive(Debug, Clone)]
pub struct MediaResponse {
    pub body: Bytes,
    pub headers: ResponseHeaders,
}

/// An upload whose transfer has started: the session observing it plus the
/// descriptor of the asset being stored, so a metadata record can be
/// persisted for the exact fingerprint that went out.
#[derive(Debug)]
pub struct StartedUpload {
    pub asset: MediaAsset,
    pub session: UploadSession,
}

/// Composes ingestion, rendition generation, storage, and retrieval into the
/// two pipeline operations: `upload` and `download`.
pub struct MediaPipeline {
    ingestor: MediaIngestor,
    renditions: RenditionGenerator,
    store: ObjectStore,
    repository: Arc<dyn MetadataRepository>,
    http: reqwest::Client,
    config: MediaConfig,
}

impl MediaPipeline {
    pub fn new(
        config: MediaConfig,
        store: ObjectStore,
        repository: Arc<dyn MetadataRepository>,
    ) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.url_fetch_timeout)
            .build()
            .map_err(MediaError::backend)?;

        Ok(Self {
            ingestor: MediaIngestor::new(&config),
            renditions: RenditionGenerator::new(&config),
            store,
            repository,
            http,
            config,
        })
    }

    /// Wire a PDF rasterizer into the rendition stage
    pub fn with_pdf_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.renditions = self.renditions.with_pdf_rasterizer(rasterizer);
        self
    }

    /// Ingest, transform, and begin storing a buffer under a namespace.
    ///
    /// Any stage failure short-circuits before the first store write; a
    /// session is only ever returned for a transfer that has started. The
    /// asset descriptor rides along for [`create_record`](Self::create_record).
    pub async fn upload<B: Into<Bytes>>(
        &self,
        namespace: &str,
        buffer: B,
    ) -> MediaResult<StartedUpload> {
        let asset = self.ingestor.from_buffer(buffer, namespace)?;
        tracing::debug!(key = %asset.full_key(), content_type = %asset.content_type, "ingested media");
        let renditions = self.renditions.generate(&asset).await?;
        let session = self.store.create_upload_stream(asset.clone(), renditions);
        Ok(StartedUpload { asset, session })
    }

    /// Resolve a locator, fetch the bytes, and build the response envelope
    pub async fn download(&self, locator: MediaLocator) -> MediaResult<MediaResponse> {
        let body = match &locator {
            MediaLocator::Key(key) => self.download_by_key(key).await?,
            MediaLocator::Url(url) => self.download_by_url(url).await?,
            MediaLocator::Id(id) => self.download_by_id(*id).await?,
        };
        Ok(self.response_envelope(body))
    }

    /// Persist the metadata record for an ingested asset
    pub async fn create_record(
        &self,
        asset: &MediaAsset,
        namespace_id: i64,
    ) -> MediaResult<MediaRecord> {
        self.repository
            .create(MediaRecordDraft::from_asset(asset, namespace_id))
            .await
    }

    /// List stored objects under a path, cleaned up for direct client use
    /// (quoted backend etags are unwrapped)
    pub async fn defaults_by_path(&self, path: &str) -> MediaResult<Vec<StoredObjectReference>> {
        Ok(self
            .store
            .list_by_path(path)
            .await?
            .into_iter()
            .map(|mut entry| {
                entry.etag = entry.etag.map(|tag| tag.trim_matches('"').to_string());
                entry
            })
            .collect())
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    async fn download_by_key(&self, key: &str) -> MediaResult<Bytes> {
        tracing::debug!(%key, "downloading media by key");
        self.store.get_object(key).await
    }

    async fn download_by_id(&self, id: i64) -> MediaResult<Bytes> {
        tracing::debug!(%id, "downloading media by record id");
        let record = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| MediaError::not_found(id.to_string()))?;
        self.download_by_key(&record.object_key()).await
    }

    async fn download_by_url(&self, url: &str) -> MediaResult<Bytes> {
        tracing::debug!(%url, "downloading media by url");
        let timeout_millis = self.config.url_fetch_timeout.as_millis() as u64;
        let map_fetch_err = |e: reqwest::Error| {
            if e.is_timeout() {
                MediaError::Timeout {
                    url: url.to_string(),
                    millis: timeout_millis,
                }
            } else {
                MediaError::backend(e)
            }
        };

        let response = self.http.get(url).send().await.map_err(map_fetch_err)?;
        if !response.status().is_success() {
            return Err(MediaError::not_found(format!(
                "{} (status {})",
                url,
                response.status().as_u16()
            )));
        }
        response.bytes().await.map_err(map_fetch_err)
    }

    fn response_envelope(&self, body: Bytes) -> MediaResponse {
        let content_type = infer::get(&body)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let max_age = self.config.cache_max_age;
        let expires = Utc::now() + chrono::Duration::from_std(max_age).unwrap_or_default();

        let headers = ResponseHeaders {
            content_type,
            cache_control: format!("public, max-age={}", max_age.as_secs()),
            expires: expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            etag: hex::encode(Sha256::digest(&body)),
        };

        MediaResponse { body, headers }
    }
}

//! # mediakit: media ingestion and object-storage pipeline
//!
//! `mediakit` validates uploaded binary content, assigns it a canonical
//! identity, derives secondary renditions (image thumbnails, PDF page
//! previews), and orchestrates an ordered multi-part transfer of the original
//! plus its renditions to an object store while reporting byte-level progress
//! and a single terminal outcome. Retrieval resolves a store key, a remote
//! URL, or an opaque metadata record id back to bytes plus computed headers.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mediakit::prelude::*;
//! use mediakit::backend::memory::MemoryBackend;
//! use mediakit::MemoryMetadataRepository;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> MediaResult<()> {
//! # let jpeg_bytes: Vec<u8> = {
//! #     let img = image::DynamicImage::new_rgb8(32, 32);
//! #     let mut out = std::io::Cursor::new(Vec::new());
//! #     img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
//! #     out.into_inner()
//! # };
//! // 1. Configure and wire a transport
//! let config = MediaConfig::default().with_host_url("https://cdn.example.com");
//! let registry = BackendRegistry::new().register(TransportKind::Memory, MemoryBackend::new());
//! let store = ObjectStore::from_registry(TransportKind::Memory, &registry, &config)?;
//!
//! // 2. Build the pipeline
//! let pipeline = MediaPipeline::new(config, store, Arc::new(MemoryMetadataRepository::new()))?;
//!
//! // 3. Upload: ingest, derive renditions, transfer with progress
//! let upload = pipeline.upload("acme", jpeg_bytes).await?;
//! let files = upload.session.wait().await?;
//!
//! // 4. Download by key, URL, or record id
//! let response = pipeline.download(MediaLocator::Key(files[0].key.clone())).await?;
//! # assert!(!response.body.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │   MediaPipeline    │  ← upload / download orchestration
//! ├──────────┬─────────┤
//! │ Ingestor │Renditions│ ← validation, identity, derived artifacts
//! ├──────────┴─────────┤
//! │    ObjectStore     │  ← ordering, progress, URLs
//! ├────────────────────┤
//! │   ObjectBackend    │  ← S3, filesystem, memory
//! └────────────────────┘
//! ```
//!
//! Uploads hand back a [`StartedUpload`] pairing the asset descriptor with
//! an [`UploadSession`]: zero or more `Progress` signals, then exactly one
//! of `Complete` / `Error`. Parts already transferred when
//! a later part fails are left in place; the pipeline is best-effort with
//! explicit failure reporting, not a durable write-ahead log.

pub mod backend;
mod config;
mod error;
mod ingest;
mod orchestrator;
mod rendition;
mod repository;
mod session;
pub mod store;
mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use backend::{BackendRegistry, ObjectBackend, ObjectEntry, ProgressSink, PutOutcome, TransportKind};
pub use config::{AllowedType, MediaConfig, TransferMode, TransferRules};
pub use error::{MediaError, MediaResult};
pub use ingest::{MediaAsset, MediaIngestor};
pub use orchestrator::{MediaPipeline, MediaResponse, ResponseHeaders, StartedUpload};
pub use rendition::{PdfRasterizer, Rendition, RenditionGenerator, RenditionSpec};
#[cfg(feature = "pdfium")]
pub use rendition::PdfiumRasterizer;
pub use repository::{
    MediaRecord, MediaRecordDraft, MemoryMetadataRepository, MetadataRepository,
};
pub use session::{SessionId, UploadEvent, UploadSession};
pub use store::ObjectStore;
pub use types::{Fingerprint, MediaLocator, StoredObjectReference, UploadPart, UploadedFile};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BackendRegistry, MediaConfig, MediaError, MediaLocator, MediaPipeline, MediaResult,
        ObjectStore, TransportKind, UploadEvent, UploadSession,
    };
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rendition::RenditionSpec;

/// One entry in the allowed-type table gating ingestion.
///
/// The `category` becomes the second segment of the storage path
/// (`namespace/category/...`), so it doubles as a coarse classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedType {
    pub extension: String,
    pub category: String,
}

impl AllowedType {
    pub fn new<E: Into<String>, C: Into<String>>(extension: E, category: C) -> Self {
        Self {
            extension: extension.into(),
            category: category.into(),
        }
    }

    /// Default allow-list covering common image, document, audio and video types
    pub fn defaults() -> Vec<Self> {
        [
            ("jpg", "image"),
            ("png", "image"),
            ("gif", "image"),
            ("webp", "image"),
            ("pdf", "document"),
            ("mp3", "audio"),
            ("ogg", "audio"),
            ("flac", "audio"),
            ("mp4", "video"),
            ("mov", "video"),
            ("webm", "video"),
        ]
        .into_iter()
        .map(|(ext, category)| Self::new(ext, category))
        .collect()
    }
}

/// How parts of one upload batch are transferred to the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// One part at a time, in order. Keeps byte-level progress accounting
    /// deterministic and bounds bandwidth.
    Sequential,
    /// Up to N parts in flight. Progress granularity drops to per-part.
    Parallel(usize),
}

/// Rules for part-based transfers to the object store
#[derive(Debug, Clone)]
pub struct TransferRules {
    pub mode: TransferMode,

    /// Upper bound on a single part transfer. The original service had none;
    /// added so a stalled backend cannot wedge a session forever.
    pub part_timeout: Duration,
}

impl Default for TransferRules {
    fn default() -> Self {
        Self {
            mode: TransferMode::Sequential,
            part_timeout: Duration::from_secs(30),
        }
    }
}

impl TransferRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }
}

/// Configuration for the media pipeline
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Public host the store serves files from; composed with object keys
    pub host_url: String,

    /// Allowed `(extension, category)` pairs; ingestion rejects anything else
    pub allowed_types: Vec<AllowedType>,

    /// Rendition sizes generated for images and PDFs
    pub crop_sizes: Vec<RenditionSpec>,

    /// Rasterization density (DPI) for PDF page previews
    pub pdf_density: u32,

    /// Bound on download-by-URL fetches
    pub url_fetch_timeout: Duration,

    /// `max-age` for the cache directive on download responses
    pub cache_max_age: Duration,

    /// Rules for part-based transfers
    pub transfer: TransferRules,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            host_url: "http://localhost:8080".to_string(),
            allowed_types: AllowedType::defaults(),
            crop_sizes: vec![RenditionSpec::of(150), RenditionSpec::of(300)],
            pdf_density: 600,
            url_fetch_timeout: Duration::from_secs(2),
            cache_max_age: Duration::from_secs(345_600),
            transfer: TransferRules::default(),
        }
    }
}

impl MediaConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the public host URL
    pub fn with_host_url<S: Into<String>>(mut self, host_url: S) -> Self {
        self.host_url = host_url.into();
        self
    }

    /// Replace the allowed-type table
    pub fn with_allowed_types(mut self, allowed_types: Vec<AllowedType>) -> Self {
        self.allowed_types = allowed_types;
        self
    }

    /// Replace the rendition size list
    pub fn with_crop_sizes(mut self, crop_sizes: Vec<RenditionSpec>) -> Self {
        self.crop_sizes = crop_sizes;
        self
    }

    /// Set PDF rasterization density
    pub fn with_pdf_density(mut self, density: u32) -> Self {
        self.pdf_density = density;
        self
    }

    /// Set the download-by-URL timeout
    pub fn with_url_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.url_fetch_timeout = timeout;
        self
    }

    /// Set the cache max-age for download responses
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Set transfer rules
    pub fn with_transfer(mut self, transfer: TransferRules) -> Self {
        self.transfer = transfer;
        self
    }

    /// Look up the category for an extension in the allowed-type table
    pub fn category_for(&self, extension: &str) -> Option<&str> {
        self.allowed_types
            .iter()
            .find(|t| t.extension == extension)
            .map(|t| t.category.as_str())
    }
}

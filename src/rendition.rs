use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::{MediaAsset, MediaConfig, MediaError, MediaResult};

/// Requested output dimension for one rendition.
///
/// `None` (or zero) means "shorter side of the source".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionSpec {
    pub size: Option<u32>,
}

impl RenditionSpec {
    /// A fixed square side in pixels
    pub fn of(size: u32) -> Self {
        Self { size: Some(size) }
    }

    /// Use the shorter side of the source
    pub fn source_fit() -> Self {
        Self { size: None }
    }

    fn resolve(&self, width: u32, height: u32) -> u32 {
        match self.size {
            Some(size) if size > 0 => size,
            _ => width.min(height).max(1),
        }
    }
}

/// A derived artifact (thumbnail, page preview) generated from a [`MediaAsset`]
#[derive(Debug, Clone)]
pub struct Rendition {
    pub buffer: Bytes,
    /// `<side>x<side>.<ext>`
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

/// Renders page one of a PDF to pixels at the given density (DPI).
///
/// A seam rather than a hard dependency: production wires the pdfium-backed
/// implementation (feature `pdfium`), tests substitute a fake.
#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn rasterize(&self, pdf: &[u8], density: u32) -> MediaResult<DynamicImage>;
}

/// Produces zero or more renditions from an asset, dispatching on the
/// detected content-type family.
pub struct RenditionGenerator {
    specs: Vec<RenditionSpec>,
    pdf_density: u32,
    pdf: Option<Arc<dyn PdfRasterizer>>,
}

impl RenditionGenerator {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            specs: config.crop_sizes.clone(),
            pdf_density: config.pdf_density,
            pdf: None,
        }
    }

    /// Wire a PDF rasterizer; without one, PDF assets fail rendition
    pub fn with_pdf_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.pdf = Some(rasterizer);
        self
    }

    /// Generate renditions for the asset.
    ///
    /// Images get one square thumbnail per configured spec, PDFs one PNG page
    /// preview per spec. Audio, video, and unrecognized families pass through
    /// with zero renditions. Generation fans out across the spec list and
    /// joins fail-fast: one failed rendition fails the batch, no partial set
    /// is returned.
    pub async fn generate(&self, asset: &MediaAsset) -> MediaResult<Vec<Rendition>> {
        if asset.is_family("image/") {
            return self.generate_image(asset).await;
        }
        if asset.content_type == "application/pdf" {
            return self.generate_pdf(asset).await;
        }
        tracing::debug!(content_type = %asset.content_type, "no rendition family, passing through");
        Ok(Vec::new())
    }

    async fn generate_image(&self, asset: &MediaAsset) -> MediaResult<Vec<Rendition>> {
        let handles: Vec<_> = self
            .specs
            .iter()
            .map(|spec| {
                let buffer = asset.buffer.clone();
                let extension = asset.extension.clone();
                let fallback = asset.content_type.clone();
                let spec = *spec;
                tokio::task::spawn_blocking(move || crop_square(&buffer, &extension, &fallback, spec))
            })
            .collect();

        collect_joined(futures::future::try_join_all(handles).await)
    }

    async fn generate_pdf(&self, asset: &MediaAsset) -> MediaResult<Vec<Rendition>> {
        let rasterizer = self
            .pdf
            .as_ref()
            .ok_or_else(|| MediaError::rendition("no PDF rasterizer configured"))?;

        // Rasterize once at full density, then derive every preview size
        let page = rasterizer.rasterize(&asset.buffer, self.pdf_density).await?;

        let handles: Vec<_> = self
            .specs
            .iter()
            .map(|spec| {
                let page = page.clone();
                let spec = *spec;
                tokio::task::spawn_blocking(move || pdf_preview(&page, spec))
            })
            .collect();

        collect_joined(futures::future::try_join_all(handles).await)
    }
}

fn collect_joined(
    joined: Result<Vec<MediaResult<Rendition>>, tokio::task::JoinError>,
) -> MediaResult<Vec<Rendition>> {
    joined
        .map_err(|e| MediaError::rendition(e.to_string()))?
        .into_iter()
        .collect()
}

/// Center-crop to a square and re-encode in the source format
fn crop_square(
    buffer: &[u8],
    extension: &str,
    fallback_type: &str,
    spec: RenditionSpec,
) -> MediaResult<Rendition> {
    let img = image::load_from_memory(buffer)
        .map_err(|e| MediaError::rendition(format!("decode failed: {}", e)))?;
    let format = ImageFormat::from_extension(extension)
        .ok_or_else(|| MediaError::rendition(format!("no encoder for .{}", extension)))?;

    let side = spec.resolve(img.width(), img.height());
    let thumb = img.resize_to_fill(side, side, FilterType::Lanczos3);
    // JPEG has no alpha channel
    let thumb = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(thumb.to_rgb8())
    } else {
        thumb
    };

    let mut out = Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, format)
        .map_err(|e| MediaError::rendition(format!("encode failed: {}", e)))?;
    let buffer: Bytes = out.into_inner().into();

    let content_type = infer::get(&buffer)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| fallback_type.to_string());

    Ok(Rendition {
        name: format!("{}x{}.{}", side, side, extension),
        content_type,
        size: buffer.len() as u64,
        buffer,
    })
}

/// Resize a rasterized PDF page to a square preview and encode as PNG
fn pdf_preview(page: &DynamicImage, spec: RenditionSpec) -> MediaResult<Rendition> {
    let side = spec.resolve(page.width(), page.height());
    let preview = page.resize_to_fill(side, side, FilterType::Lanczos3);

    let mut out = Cursor::new(Vec::new());
    preview
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| MediaError::rendition(format!("encode failed: {}", e)))?;
    let buffer: Bytes = out.into_inner().into();

    Ok(Rendition {
        name: format!("{}x{}.png", side, side),
        content_type: "image/png".to_string(),
        size: buffer.len() as u64,
        buffer,
    })
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use async_trait::async_trait;
    use image::DynamicImage;
    use pdfium_render::prelude::*;

    use super::PdfRasterizer;
    use crate::{MediaError, MediaResult};

    /// Rasterizes page one of a PDF through the system pdfium library.
    ///
    /// Binds per call so the rasterizer stays `Send + Sync`; pdfium handles
    /// are not thread-safe.
    pub struct PdfiumRasterizer;

    #[async_trait]
    impl PdfRasterizer for PdfiumRasterizer {
        async fn rasterize(&self, pdf: &[u8], density: u32) -> MediaResult<DynamicImage> {
            let bytes = pdf.to_vec();
            tokio::task::spawn_blocking(move || {
                let bindings = Pdfium::bind_to_system_library()
                    .map_err(|e| MediaError::rendition(format!("pdfium bind failed: {:?}", e)))?;
                let pdfium = Pdfium::new(bindings);
                let document = pdfium
                    .load_pdf_from_byte_slice(&bytes, None)
                    .map_err(|e| MediaError::rendition(format!("pdf load failed: {:?}", e)))?;
                let page = document
                    .pages()
                    .first()
                    .map_err(|e| MediaError::rendition(format!("pdf has no pages: {:?}", e)))?;

                // Points are 1/72in; density is DPI
                let width_px = (page.width().value / 72.0 * density as f32).round().max(1.0) as i32;
                let bitmap = page
                    .render_with_config(&PdfRenderConfig::new().set_target_width(width_px))
                    .map_err(|e| MediaError::rendition(format!("pdf render failed: {:?}", e)))?;
                Ok(bitmap.as_image())
            })
            .await
            .map_err(|e| MediaError::rendition(e.to_string()))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::jpeg_buffer;
    use crate::{Fingerprint, MediaIngestor};

    fn generator(specs: Vec<RenditionSpec>) -> RenditionGenerator {
        RenditionGenerator::new(&MediaConfig::default().with_crop_sizes(specs))
    }

    fn asset_with(content_type: &str, extension: &str, buffer: Bytes) -> MediaAsset {
        let fingerprint = Fingerprint::new();
        MediaAsset {
            name: format!("{}.{}", fingerprint, extension),
            category: "image".to_string(),
            extension: extension.to_string(),
            content_type: content_type.to_string(),
            size: buffer.len() as u64,
            buffer,
            namespace: "acme".to_string(),
            path: "acme/image".to_string(),
            thumbs_dir: format!("acme/image/{}", fingerprint),
            fingerprint,
        }
    }

    fn ingest_jpeg(width: u32, height: u32) -> MediaAsset {
        MediaIngestor::new(&MediaConfig::default())
            .from_buffer(jpeg_buffer(width, height), "acme")
            .unwrap()
    }

    #[tokio::test]
    async fn test_image_renditions_are_square_at_requested_sizes() {
        let asset = ingest_jpeg(120, 80);
        let renditions = generator(vec![RenditionSpec::of(50), RenditionSpec::of(100)])
            .generate(&asset)
            .await
            .unwrap();

        assert_eq!(renditions.len(), 2);
        for (rendition, side) in renditions.iter().zip([50u32, 100]) {
            assert_eq!(rendition.name, format!("{}x{}.jpg", side, side));
            assert_eq!(rendition.content_type, "image/jpeg");
            let img = image::load_from_memory(&rendition.buffer).unwrap();
            assert_eq!((img.width(), img.height()), (side, side));
        }
    }

    #[tokio::test]
    async fn test_unspecified_size_uses_shorter_source_side() {
        let asset = ingest_jpeg(120, 80);
        let renditions = generator(vec![RenditionSpec::source_fit()])
            .generate(&asset)
            .await
            .unwrap();

        assert_eq!(renditions.len(), 1);
        assert_eq!(renditions[0].name, "80x80.jpg");
        let img = image::load_from_memory(&renditions[0].buffer).unwrap();
        assert_eq!((img.width(), img.height()), (80, 80));
    }

    #[tokio::test]
    async fn test_audio_and_unknown_families_pass_through() {
        let audio = asset_with("audio/mpeg", "mp3", Bytes::from_static(b"not really audio"));
        let other = asset_with("application/zip", "zip", Bytes::from_static(b"not really a zip"));
        let gen = generator(vec![RenditionSpec::of(50)]);
        assert!(gen.generate(&audio).await.unwrap().is_empty());
        assert!(gen.generate(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_whole_batch() {
        let asset = asset_with("image/jpeg", "jpg", Bytes::from_static(b"\xff\xd8\xffgarbage"));
        let err = generator(vec![RenditionSpec::of(50), RenditionSpec::of(100)])
            .generate(&asset)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Rendition { .. }));
    }

    struct SolidPage;

    #[async_trait]
    impl PdfRasterizer for SolidPage {
        async fn rasterize(&self, _pdf: &[u8], _density: u32) -> MediaResult<DynamicImage> {
            Ok(DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                600,
                800,
                image::Rgb([240, 240, 240]),
            )))
        }
    }

    #[tokio::test]
    async fn test_pdf_previews_are_png() {
        let asset = asset_with("application/pdf", "pdf", Bytes::from_static(b"%PDF-1.4"));
        let renditions = generator(vec![RenditionSpec::of(50), RenditionSpec::of(100)])
            .with_pdf_rasterizer(std::sync::Arc::new(SolidPage))
            .generate(&asset)
            .await
            .unwrap();

        assert_eq!(renditions.len(), 2);
        assert_eq!(renditions[0].name, "50x50.png");
        assert_eq!(renditions[1].name, "100x100.png");
        for rendition in &renditions {
            assert_eq!(rendition.content_type, "image/png");
            assert_eq!(infer::get(&rendition.buffer).unwrap().extension(), "png");
        }
    }

    #[tokio::test]
    async fn test_pdf_without_rasterizer_fails_rendition() {
        let asset = asset_with("application/pdf", "pdf", Bytes::from_static(b"%PDF-1.4"));
        let err = generator(vec![RenditionSpec::of(50)])
            .generate(&asset)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Rendition { .. }));
    }
}

//! OCR provider layer.
//!
//! One operation: turn a file path into text plus per-line bounding boxes.
//! The engine is the strategy factory - callers never pick a provider:
//!
//! - Images: Textract only (production quality). Disabled Textract fails
//!   with `OcrUnavailable`.
//! - PDFs: direct text-layer read first; scanned PDFs go to Tesseract when
//!   its confidence clears the gate (default 0.96), otherwise Textract on
//!   a rasterized first page.
//!
//! Providers are lazily constructed and stateless per call.

pub mod pdf_text;
pub mod raster;
pub mod tesseract;
pub mod textract;

use crate::config::{OcrBackend, Settings};
use crate::errors::{Error, Result};
use crate::models::OcrBox;
use async_trait::async_trait;
use std::path::Path;

/// How the text was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMethod {
    Textract,
    Tesseract,
    PdfTextExtraction,
}

impl OcrMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Textract => "textract",
            Self::Tesseract => "tesseract",
            Self::PdfTextExtraction => "pdf_text_extraction",
        }
    }
}

/// Result of OCR extraction.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    /// Overall confidence in `[0, 1]`.
    pub confidence: f64,
    pub page_count: i32,
    pub method: OcrMethod,
    pub bounding_boxes: Vec<OcrBox>,
}

/// Contract for all OCR providers, and for the engine itself so the
/// pipeline can run against a fake in tests.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extracts text from an image or PDF file.
    ///
    /// # Errors
    /// `OcrUnavailable` when the needed backend is disabled, `OcrFailed`
    /// when extraction produces nothing usable.
    async fn extract_text(&self, path: &Path) -> Result<OcrResult>;

    /// Whether this provider can process the given file type.
    fn supports(&self, path: &Path) -> bool;
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "heif", "tiff", "tif", "bmp"];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[must_use]
pub fn is_image(path: &Path) -> bool {
    IMAGE_EXTENSIONS.contains(&extension(path).as_str())
}

#[must_use]
pub fn is_pdf(path: &Path) -> bool {
    extension(path) == "pdf"
}

/// The strategy factory. One long-lived instance with lazily-constructed
/// providers.
pub struct OcrEngine {
    backend: OcrBackend,
    textract_enabled: bool,
    textract_region: String,
    tesseract_min_confidence: f64,
    textract: tokio::sync::OnceCell<textract::TextractProvider>,
    tesseract_available: tokio::sync::OnceCell<bool>,
}

impl OcrEngine {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            backend: settings.ocr_backend,
            textract_enabled: settings.textract_enabled,
            textract_region: settings.textract_region.clone(),
            tesseract_min_confidence: settings.tesseract_min_confidence,
            textract: tokio::sync::OnceCell::new(),
            tesseract_available: tokio::sync::OnceCell::new(),
        }
    }

    fn tesseract_enabled(&self) -> bool {
        // In `textract` mode the local OCR path is off entirely
        !matches!(self.backend, OcrBackend::Textract)
    }

    async fn textract(&self) -> Result<&textract::TextractProvider> {
        if !self.textract_enabled {
            return Err(Error::OcrUnavailable {
                message: "Textract is disabled but was requested".to_string(),
            });
        }
        Ok(self
            .textract
            .get_or_init(|| textract::TextractProvider::new(self.textract_region.clone()))
            .await)
    }

    async fn tesseract_ready(&self) -> bool {
        self.tesseract_enabled()
            && *self
                .tesseract_available
                .get_or_init(tesseract::TesseractProvider::available)
                .await
    }

    async fn extract_from_image(&self, path: &Path) -> Result<OcrResult> {
        // Images always use Textract; local OCR quality on photos is not
        // acceptable for bookkeeping.
        if !self.textract_enabled {
            return Err(Error::OcrUnavailable {
                message: "images require Textract, but Textract is disabled".to_string(),
            });
        }
        tracing::info!(file = %path.display(), "ocr_using_textract_for_image");
        self.textract()
            .await?
            .extract_text(path)
            .await
            .map_err(|error| match error {
                // Images have no fallback: a Textract failure means OCR is
                // effectively unavailable for this receipt
                Error::OcrFailed { message } => Error::OcrUnavailable { message },
                other => other,
            })
    }

    async fn extract_from_pdf(&self, path: &Path) -> Result<OcrResult> {
        tracing::info!(file = %path.display(), "ocr_pdf_strategy");

        // Stage 1: the embedded text layer is free and exact
        match pdf_text::PdfTextProvider.extract_text(path).await {
            Ok(result) if !result.text.trim().is_empty() => {
                tracing::info!(chars = result.text.len(), pages = result.page_count, "pdf_text_extraction_success");
                return Ok(result);
            }
            Ok(_) => tracing::info!("pdf_has_empty_text_layer"),
            Err(error) => tracing::info!(%error, "pdf_requires_ocr"),
        }

        // Stage 2: local Tesseract, gated on confidence
        if self.tesseract_ready().await {
            match tesseract::TesseractProvider.extract_text(path).await {
                Ok(result) if result.confidence >= self.tesseract_min_confidence => {
                    tracing::info!(confidence = result.confidence, "tesseract_confidence_acceptable");
                    return Ok(result);
                }
                Ok(result) => tracing::warn!(
                    confidence = result.confidence,
                    threshold = self.tesseract_min_confidence,
                    "tesseract_confidence_too_low"
                ),
                Err(error) => tracing::error!(%error, "tesseract_failed"),
            }
        }

        // Stage 3: Textract on a rasterized first page
        if !self.textract_enabled {
            return Err(Error::OcrFailed {
                message: "scanned PDF needs Textract, but Textract is disabled".to_string(),
            });
        }
        tracing::info!("pdf_using_textract_fallback");
        let page = tesseract::rasterize_first_page(path).await?;
        let result = self.textract().await?.extract_text(&page).await;
        let _ = tokio::fs::remove_file(&page).await;
        result
    }
}

#[async_trait]
impl OcrProvider for OcrEngine {
    async fn extract_text(&self, path: &Path) -> Result<OcrResult> {
        if is_image(path) {
            self.extract_from_image(path).await
        } else if is_pdf(path) {
            self.extract_from_pdf(path).await
        } else {
            Err(Error::UnsupportedFileType {
                extension: extension(path),
            })
        }
    }

    fn supports(&self, path: &Path) -> bool {
        is_image(path) || is_pdf(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_detection() {
        assert!(is_image(Path::new("/x/original.JPG")));
        assert!(is_image(Path::new("/x/original.heic")));
        assert!(is_pdf(Path::new("/x/original.pdf")));
        assert!(!is_image(Path::new("/x/original.pdf")));
        assert!(!is_pdf(Path::new("/x/original")));
    }

    #[tokio::test]
    async fn image_with_textract_disabled_is_unavailable() {
        let settings = Settings {
            textract_enabled: false,
            ..Settings::default()
        };
        let engine = OcrEngine::new(&settings);
        let error = engine
            .extract_text(Path::new("/nonexistent/receipt.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::OcrUnavailable { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let engine = OcrEngine::new(&Settings::default());
        let error = engine
            .extract_text(Path::new("/tmp/notes.docx"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnsupportedFileType { .. }));
    }
}

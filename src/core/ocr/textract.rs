//! AWS Textract provider.
//!
//! The production-quality path for raster receipts. HEIC/HEIF photos are
//! transcoded to PNG before dispatch; Textract's `detect_document_text`
//! returns LINE blocks whose geometry is already page-normalized `[0, 1]`,
//! so boxes are stored as-is. Overall confidence is the mean of per-line
//! confidences mapped to `[0, 1]`.

use super::{OcrMethod, OcrProvider, OcrResult};
use crate::core::ocr::raster;
use crate::errors::{Error, Result};
use crate::models::OcrBox;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{BlockType, Document};
use std::path::Path;

pub struct TextractProvider {
    client: aws_sdk_textract::Client,
}

impl TextractProvider {
    pub async fn new(region: String) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        tracing::info!(region, "textract_provider_initialized");
        Self {
            client: aws_sdk_textract::Client::new(&shared),
        }
    }
}

#[async_trait]
impl OcrProvider for TextractProvider {
    async fn extract_text(&self, path: &Path) -> Result<OcrResult> {
        if !self.supports(path) {
            return Err(Error::UnsupportedFileType {
                extension: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        // Textract does not accept HEIC/HEIF
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (bytes, transcoded) = if matches!(ext.as_str(), "heic" | "heif") {
            let png = raster::transcode_heic_to_png(path).await?;
            (tokio::fs::read(&png).await?, Some(png))
        } else {
            (tokio::fs::read(path).await?, None)
        };

        tracing::info!(file = %path.display(), size_bytes = bytes.len(), "calling_textract");

        let response = self
            .client
            .detect_document_text()
            .document(Document::builder().bytes(Blob::new(bytes)).build())
            .send()
            .await
            .map_err(|e| Error::OcrFailed {
                message: format!("Textract call failed: {e}"),
            });

        if let Some(png) = transcoded {
            let _ = tokio::fs::remove_file(&png).await;
        }
        let response = response?;

        let mut text_lines = Vec::new();
        let mut confidences = Vec::new();
        let mut boxes = Vec::new();
        let mut max_page = 1;

        for block in response.blocks() {
            if block.block_type() != Some(&BlockType::Line) {
                continue;
            }
            let Some(line_text) = block.text() else {
                continue;
            };
            let page = block.page().unwrap_or(1);
            max_page = max_page.max(page);
            let confidence = f64::from(block.confidence().unwrap_or(0.0)) / 100.0;

            text_lines.push(line_text.to_string());
            confidences.push(confidence);

            if let Some(bbox) = block.geometry().and_then(|g| g.bounding_box()) {
                boxes.push(OcrBox {
                    page,
                    line_number: text_lines.len() as i32 - 1,
                    text: line_text.to_string(),
                    left: f64::from(bbox.left()),
                    top: f64::from(bbox.top()),
                    width: f64::from(bbox.width()),
                    height: f64::from(bbox.height()),
                });
            }
        }

        if text_lines.is_empty() {
            return Err(Error::OcrFailed {
                message: format!("Textract returned no text for {}", path.display()),
            });
        }

        let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;

        tracing::info!(
            lines = text_lines.len(),
            confidence,
            boxes = boxes.len(),
            "textract_complete"
        );

        Ok(OcrResult {
            text: text_lines.join("\n"),
            confidence,
            page_count: max_page,
            method: OcrMethod::Textract,
            bounding_boxes: boxes,
        })
    }

    fn supports(&self, path: &Path) -> bool {
        super::is_image(path)
    }
}
